//! Read preferences, tag sets and the criteria used to pick a server for an operation.


use std::{collections::HashMap, sync::Arc, time::Duration};

use derive_where::derive_where;
use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    options::ServerAddress,
    sdam::ServerDescription,
};

/// Describes which servers are suitable for a given operation.
#[derive(Clone, derive_more::Display)]
#[derive_where(Debug)]
#[non_exhaustive]
pub enum SelectionCriteria {
    /// A read preference that describes the suitable servers based on the server type, max
    /// staleness, and server tags.
    #[display("ReadPreference {_0}")]
    ReadPreference(ReadPreference),

    /// A predicate used to filter servers that are considered suitable. A `server` will be
    /// considered suitable by a `predicate` if `predicate(server)` returns true.
    #[display("Custom predicate")]
    Predicate(#[derive_where(skip)] Predicate),
}

impl PartialEq for SelectionCriteria {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ReadPreference(r1), Self::ReadPreference(r2)) => r1 == r2,
            _ => false,
        }
    }
}

impl From<ReadPreference> for SelectionCriteria {
    fn from(read_pref: ReadPreference) -> Self {
        Self::ReadPreference(read_pref)
    }
}

impl SelectionCriteria {
    pub(crate) fn as_read_pref(&self) -> Option<&ReadPreference> {
        match self {
            Self::ReadPreference(ref read_pref) => Some(read_pref),
            Self::Predicate(..) => None,
        }
    }

    pub(crate) fn is_read_pref_primary(&self) -> bool {
        matches!(self, Self::ReadPreference(ReadPreference::Primary))
    }

    /// Pins selection to a single server, as needed by follow-up cursor commands.
    pub(crate) fn from_address(address: ServerAddress) -> Self {
        SelectionCriteria::Predicate(Arc::new(move |server| server.address == address))
    }
}

/// A predicate used to filter servers that are considered suitable.
pub type Predicate = Arc<dyn Send + Sync + Fn(&ServerDescription) -> bool>;

/// Specifies how the driver should route a read operation to members of a replica set.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    Primary,

    /// Only route this operation to a secondary.
    Secondary { options: ReadPreferenceOptions },

    /// Route this operation to the primary if it's available, but fall back to the secondaries
    /// if not.
    PrimaryPreferred { options: ReadPreferenceOptions },

    /// Route this operation to a secondary if one is available, but fall back to the primary if
    /// not.
    SecondaryPreferred { options: ReadPreferenceOptions },

    /// Route this operation to the node with the least network latency regardless of whether
    /// it's the primary or a secondary.
    Nearest { options: ReadPreferenceOptions },
}

impl std::fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ Mode: {}", self.mode())?;
        if let Some(options) = self.options() {
            if !options.tag_sets.is_empty() {
                write!(f, ", Tag Sets: {:?}", options.tag_sets)?;
            }
            if let Some(max_staleness) = options.max_staleness {
                write!(f, ", Max Staleness: {max_staleness:?}")?;
            }
        }
        write!(f, " }}")
    }
}

impl Serialize for ReadPreference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[skip_serializing_none]
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ReadPreferenceHelper<'a> {
            mode: &'static str,
            tags: Option<&'a Vec<TagSet>>,
            max_staleness_seconds: Option<u64>,
        }

        let options = self.options();
        ReadPreferenceHelper {
            mode: self.mode(),
            tags: options
                .map(|o| &o.tag_sets)
                .filter(|tag_sets| !tag_sets.is_empty()),
            max_staleness_seconds: self.max_staleness().map(|d| d.as_secs()),
        }
        .serialize(serializer)
    }
}

/// Specifies read preference options for non-primary read preferences.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Specifies which replica set members should be considered for operations. Each tag set
    /// will be checked in order until one or more servers is found with each tag in the set.
    pub tag_sets: Vec<TagSet>,

    /// Specifies the maximum amount of lag behind the primary that a secondary can be to be
    /// considered for the given operation. Any secondaries lagging behind more than
    /// `max_staleness` will not be considered for the operation. A zero value means no bound.
    pub max_staleness: Option<Duration>,

    /// Overrides the client's latency window for operations using this read preference.
    pub local_threshold: Option<Duration>,

    /// Overrides the client's server selection timeout for operations using this read
    /// preference.
    pub server_selection_timeout: Option<Duration>,
}

impl ReadPreferenceOptions {
    pub(crate) fn is_default(&self) -> bool {
        self.max_staleness.is_none()
            && (self.tag_sets.is_empty() || self.tag_sets[..] == [TagSet::default()])
    }
}

impl ReadPreference {
    /// Route to a secondary, with the given options.
    pub fn secondary(options: ReadPreferenceOptions) -> Self {
        Self::Secondary { options }
    }

    /// Prefer the primary, falling back to a secondary, with the given options.
    pub fn primary_preferred(options: ReadPreferenceOptions) -> Self {
        Self::PrimaryPreferred { options }
    }

    /// Prefer a secondary, falling back to the primary, with the given options.
    pub fn secondary_preferred(options: ReadPreferenceOptions) -> Self {
        Self::SecondaryPreferred { options }
    }

    /// Any data-bearing member within the latency window, with the given options.
    pub fn nearest(options: ReadPreferenceOptions) -> Self {
        Self::Nearest { options }
    }

    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary { .. } => "secondary",
            Self::PrimaryPreferred { .. } => "primaryPreferred",
            Self::SecondaryPreferred { .. } => "secondaryPreferred",
            Self::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            Self::Primary => None,
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => Some(options),
        }
    }

    fn options_mut(&mut self, what: &str) -> Result<&mut ReadPreferenceOptions> {
        match self {
            Self::Primary => Err(Error::invalid_argument(format!(
                "{what} can only be specified when a non-primary mode is specified"
            ))),
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => Ok(options),
        }
    }

    pub(crate) fn max_staleness(&self) -> Option<Duration> {
        self.options()
            .and_then(|options| options.max_staleness)
            .filter(|max_staleness| !max_staleness.is_zero())
    }

    pub(crate) fn tag_sets(&self) -> &[TagSet] {
        self.options()
            .map(|options| options.tag_sets.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn local_threshold(&self) -> Option<Duration> {
        self.options().and_then(|options| options.local_threshold)
    }

    pub(crate) fn server_selection_timeout(&self) -> Option<Duration> {
        self.options()
            .and_then(|options| options.server_selection_timeout)
    }

    /// Returns this read preference with the given tag sets. Fails for `Primary`, which never
    /// considers tags.
    pub fn with_tags(mut self, tag_sets: Vec<TagSet>) -> Result<Self> {
        self.options_mut("read preference tags")?.tag_sets = tag_sets;
        Ok(self)
    }

    /// Returns this read preference with the given staleness bound. Fails for `Primary`.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        self.options_mut("max staleness")?.max_staleness = Some(max_staleness);
        Ok(self)
    }
}

/// A read preference tag set. See the documentation [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/) for more details.
pub type TagSet = HashMap<String, String>;

/// Whether every key/value pair of `tag_set` is present in `server_tags`. The empty tag set
/// matches any server.
pub fn tag_set_matches(tag_set: &TagSet, server_tags: &TagSet) -> bool {
    tag_set
        .iter()
        .all(|(key, value)| server_tags.get(key) == Some(value))
}

/// Narrows `candidates` to the servers matching the first tag set in `tag_sets` that matches at
/// least one candidate. Later tag sets are never consulted once one matches. Returns an empty
/// list if no tag set matches anything; an empty `tag_sets` list leaves `candidates` untouched.
pub fn select_by_tags<'a>(
    tag_sets: &[TagSet],
    candidates: Vec<&'a ServerDescription>,
) -> Vec<&'a ServerDescription> {
    if tag_sets.is_empty() {
        return candidates;
    }

    for tag_set in tag_sets {
        let matches: Vec<_> = candidates
            .iter()
            .copied()
            .filter(|server| tag_set_matches(tag_set, &server.tags))
            .collect();
        if !matches.is_empty() {
            return matches;
        }
    }

    Vec::new()
}
