pub(crate) mod server_selection;

use std::{collections::HashMap, fmt};

use crate::{
    options::ServerAddress,
    sdam::description::server::{ServerDescription, ServerType},
};

/// The type of a deployment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[non_exhaustive]
pub enum TopologyType {
    /// A single mongod server, connected to directly.
    Single,

    /// A replica set with no primary.
    ReplicaSetNoPrimary,

    /// A replica set with a primary.
    ReplicaSetWithPrimary,

    /// A sharded deployment.
    Sharded,

    /// A topology whose type is not yet known.
    #[default]
    Unknown,
}

impl fmt::Display for TopologyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Single => "Single",
            Self::ReplicaSetNoPrimary => "ReplicaSetNoPrimary",
            Self::ReplicaSetWithPrimary => "ReplicaSetWithPrimary",
            Self::Sharded => "Sharded",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// An immutable snapshot of the deployment. Selection reads a cloned copy so that a single
/// selection attempt never observes a half-applied update.
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct TopologyDescription {
    /// The type of the topology.
    pub topology_type: TopologyType,

    /// The known servers, keyed by address.
    pub servers: HashMap<ServerAddress, ServerDescription>,
}

impl TopologyDescription {
    /// An empty topology of the given type.
    pub fn new(topology_type: TopologyType) -> Self {
        Self {
            topology_type,
            servers: HashMap::new(),
        }
    }

    /// Adds or replaces the description of one server.
    pub fn with_server(mut self, server: ServerDescription) -> Self {
        self.servers.insert(server.address.clone(), server);
        self
    }

    /// The description of the server at `address`, if it is part of this topology.
    pub fn get_server(&self, address: &ServerAddress) -> Option<&ServerDescription> {
        self.servers.get(address)
    }

    /// Whether any server is known to be the primary.
    pub(crate) fn has_primary(&self) -> bool {
        self.servers
            .values()
            .any(|server| server.server_type == ServerType::RsPrimary)
    }
}

impl fmt::Display for TopologyDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ Type: {}, Servers: [ ", self.topology_type)?;
        let mut servers: Vec<_> = self.servers.values().collect();
        servers.sort_by_key(|server| server.address.to_string());
        for server in servers {
            write!(
                f,
                "{{ Address: {}, Type: {:?}, Average RTT: {:?} }}, ",
                server.address, server.server_type, server.average_round_trip_time
            )?;
        }
        write!(f, "] }}")
    }
}
