use std::sync::Mutex;

use derive_where::derive_where;
use serde::{Deserialize, Serialize};

use crate::bson::{Document, Timestamp};

/// Struct modeling a cluster time reported by the server.
///
/// Cluster times are ordered by their logical timestamp only; the signature does not take part in
/// comparisons.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[derive_where(PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTime {
    pub(crate) cluster_time: Timestamp,

    #[derive_where(skip)]
    #[serde(default)]
    pub(crate) signature: Document,
}

impl ClusterTime {
    /// A cluster time for the given logical timestamp, with an empty signature.
    pub fn new(cluster_time: Timestamp) -> Self {
        Self {
            cluster_time,
            signature: Document::new(),
        }
    }

    /// The logical timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.cluster_time
    }
}

impl std::cmp::Ord for ClusterTime {
    fn cmp(&self, other: &ClusterTime) -> std::cmp::Ordering {
        let this = (self.cluster_time.time, self.cluster_time.increment);
        let other = (other.cluster_time.time, other.cluster_time.increment);
        this.cmp(&other)
    }
}

impl std::cmp::PartialOrd for ClusterTime {
    fn partial_cmp(&self, other: &ClusterTime) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The highest cluster time observed so far. Concurrent `advance` calls are serialized by a
/// mutex, so the held value never moves backwards.
#[derive(Debug, Default)]
pub(crate) struct ClusterTimeTracker {
    latest: Mutex<Option<ClusterTime>>,
}

impl ClusterTimeTracker {
    /// Keeps the greater of the held and the observed cluster time.
    pub(crate) fn advance(&self, observed: &ClusterTime) {
        let mut latest = self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if latest.as_ref().is_none_or(|current| current < observed) {
            *latest = Some(observed.clone());
        }
    }

    /// The value to attach to the next outgoing command.
    pub(crate) fn snapshot_for_outgoing(&self) -> Option<ClusterTime> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
