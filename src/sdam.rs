//! Topology state consumed by server selection. The monitoring that produces it lives outside this
//! crate and publishes snapshots through a [`TopologyUpdater`].

mod description;
mod topology;

pub use self::{
    description::{
        server::{ServerDescription, ServerType},
        topology::{TopologyDescription, TopologyType},
    },
    topology::{topology_channel, TopologyUpdater, TopologyWatcher},
};

pub(crate) use self::{
    description::topology::server_selection::SELECTION_BACKOFF,
    topology::Topology,
};
