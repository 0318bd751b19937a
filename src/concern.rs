//! Write concern and the read concern fragment used for causally consistent reads.


use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::Timestamp,
    error::{Error, Result},
    serde_util,
};

/// The `readConcern` document attached to reads on a causally consistent session.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadConcernInternal {
    pub(crate) after_cluster_time: Option<Timestamp>,
}

impl ReadConcernInternal {
    pub(crate) fn after(operation_time: Timestamp) -> Self {
        Self {
            after_cluster_time: Some(operation_time),
        }
    }
}

/// The level of acknowledgement requested from the server before a write is considered
/// successful.
///
/// `w: 0` makes the write unacknowledged: the driver returns as soon as the message is sent and
/// no counts or errors are reported.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct WriteConcern {
    /// How many members must acknowledge the write.
    pub w: Option<Acknowledgment>,

    /// How long the server waits for the acknowledgement before reporting a write concern error.
    #[serde(rename = "wtimeout")]
    #[serde(serialize_with = "serde_util::serialize_duration_option_as_int_millis")]
    #[serde(deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis")]
    #[serde(default)]
    pub w_timeout: Option<Duration>,

    /// Whether the write must reach the on-disk journal.
    #[serde(rename = "j")]
    pub journal: Option<bool>,
}

/// The `w` field of a [`WriteConcern`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Acknowledgment {
    /// A fixed number of members. `Nodes(0)` disables acknowledgement.
    Nodes(u32),

    /// A majority of voting members.
    Majority,

    /// A custom write concern mode defined on the replica set.
    Custom(String),
}

impl Serialize for Acknowledgment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Acknowledgment::Nodes(n) => bson::serde_helpers::serialize_u32_as_i32(n, serializer),
            Acknowledgment::Majority => serializer.serialize_str("majority"),
            Acknowledgment::Custom(mode) => serializer.serialize_str(mode),
        }
    }
}

impl<'de> Deserialize<'de> for Acknowledgment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NodesOrMode {
            Nodes(u32),
            Mode(String),
        }

        Ok(match NodesOrMode::deserialize(deserializer)? {
            NodesOrMode::Nodes(n) => Acknowledgment::Nodes(n),
            NodesOrMode::Mode(mode) => mode.into(),
        })
    }
}

impl From<u32> for Acknowledgment {
    fn from(n: u32) -> Self {
        Acknowledgment::Nodes(n)
    }
}

impl From<&str> for Acknowledgment {
    fn from(mode: &str) -> Self {
        mode.to_string().into()
    }
}

impl From<String> for Acknowledgment {
    fn from(mode: String) -> Self {
        match mode.as_str() {
            "majority" => Acknowledgment::Majority,
            _ => Acknowledgment::Custom(mode),
        }
    }
}

impl From<Acknowledgment> for WriteConcern {
    fn from(w: Acknowledgment) -> Self {
        WriteConcern {
            w: Some(w),
            ..Default::default()
        }
    }
}

impl WriteConcern {
    /// Requires acknowledgement from `n` members.
    pub fn nodes(n: u32) -> Self {
        Acknowledgment::Nodes(n).into()
    }

    /// Requires acknowledgement from a majority of members.
    pub fn majority() -> Self {
        Acknowledgment::Majority.into()
    }

    /// Fire-and-forget writes.
    pub fn unacknowledged() -> Self {
        Self::nodes(0)
    }

    /// Whether the server will send back an acknowledgement for writes using this concern.
    pub fn is_acknowledged(&self) -> bool {
        self.w != Some(Acknowledgment::Nodes(0)) || self.journal == Some(true)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.w.is_none() && self.w_timeout.is_none() && self.journal.is_none()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.w == Some(Acknowledgment::Nodes(0)) && self.journal == Some(true) {
            return Err(Error::invalid_argument(
                "write concern cannot have w=0 and j=true",
            ));
        }
        Ok(())
    }
}
