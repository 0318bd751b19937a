use std::time::Duration;

use crate::{
    bson::DateTime,
    cmap::conn::wire::GENERIC_COMMAND_MIN_WIRE_VERSION,
    options::ServerAddress,
    selection_criteria::TagSet,
};

/// The role a server plays in its deployment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replica set mongod.
    Standalone,

    /// A router used in sharded deployments.
    Mongos,

    /// The primary node in a replica set.
    RsPrimary,

    /// A secondary node in a replica set.
    RsSecondary,

    /// A server that is not reachable or whose role has not been determined.
    #[default]
    Unknown,
}

impl ServerType {
    pub(crate) fn is_data_bearing(self) -> bool {
        matches!(
            self,
            ServerType::Standalone
                | ServerType::RsPrimary
                | ServerType::RsSecondary
                | ServerType::Mongos
        )
    }
}

/// A point-in-time description of one server, as reported by the monitoring collaborator.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ServerDescription {
    /// The address of the server.
    pub address: ServerAddress,

    /// The role of the server.
    pub server_type: ServerType,

    /// The replica set tags of the server.
    pub tags: TagSet,

    /// The average round trip time to the server.
    pub average_round_trip_time: Duration,

    /// The highest wire protocol version the server supports. Drives the choice of message shape.
    pub max_wire_version: Option<i32>,

    /// When the monitor last refreshed this description.
    pub last_update_time: Option<DateTime>,

    /// How far this server lags behind the primary, if the monitor could estimate it.
    pub staleness: Option<Duration>,
}

impl ServerDescription {
    /// Describes a server of the given type with no tags and zero round trip time.
    pub fn new(address: ServerAddress, server_type: ServerType) -> Self {
        Self {
            address,
            server_type,
            tags: TagSet::new(),
            average_round_trip_time: Duration::ZERO,
            max_wire_version: None,
            last_update_time: None,
            staleness: None,
        }
    }

    /// Sets the replica set tags.
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the average round trip time.
    pub fn with_round_trip_time(mut self, rtt: Duration) -> Self {
        self.average_round_trip_time = rtt;
        self
    }

    /// Sets the max wire version.
    pub fn with_max_wire_version(mut self, version: i32) -> Self {
        self.max_wire_version = Some(version);
        self
    }

    /// Sets the staleness estimate.
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = Some(staleness);
        self
    }

    /// Sets the last update time.
    pub fn with_last_update_time(mut self, time: DateTime) -> Self {
        self.last_update_time = Some(time);
        self
    }

    pub(crate) fn is_available(&self) -> bool {
        self.server_type != ServerType::Unknown
    }

    /// Logical sessions require the generic command shape and a data-bearing server.
    pub(crate) fn supports_sessions(&self) -> bool {
        self.server_type.is_data_bearing()
            && self
                .max_wire_version
                .is_some_and(|version| version >= GENERIC_COMMAND_MIN_WIRE_VERSION)
    }

    pub(crate) fn supports_retryable_writes(&self) -> bool {
        self.server_type != ServerType::Standalone && self.supports_sessions()
    }
}
