//! The operation execution core of a MongoDB client.
//!
//! This crate takes a CRUD request from the caller and carries it to a server and back: it
//! selects a server from an externally maintained topology snapshot according to a read
//! preference, checks out a pooled connection to it, frames the command in the wire shape the
//! server understands (OP_MSG for servers with max wire version 6 or above, OP_QUERY before),
//! sends it under the operation's deadline, and validates the reply into typed results or
//! errors. Retryable operations are retried once after a network or checkout failure, and
//! sessions carry the cluster time and causal consistency token between operations.
//!
//! Topology monitoring is not part of this crate. A monitor publishes
//! [`sdam::TopologyDescription`] snapshots through the [`sdam::TopologyUpdater`] half of
//! [`sdam::topology_channel`], and the [`Client`] reads them through the watcher half.
//!
//! ```no_run
//! # use mongo_exec::{
//! #     bson::{doc, Document},
//! #     error::Result,
//! #     options::{ClientOptions, ServerAddress},
//! #     sdam::{
//! #         topology_channel,
//! #         ServerDescription,
//! #         ServerType,
//! #         TopologyDescription,
//! #         TopologyType,
//! #     },
//! #     Client,
//! # };
//! # async fn run() -> Result<()> {
//! let address = ServerAddress::parse("localhost:27017")?;
//! let primary =
//!     ServerDescription::new(address, ServerType::Standalone).with_max_wire_version(17);
//! let (_updater, watcher) =
//!     topology_channel(TopologyDescription::new(TopologyType::Single).with_server(primary));
//!
//! let client = Client::new(ClientOptions::default(), watcher)?;
//! let coll = client.database("test").collection::<Document>("people");
//! let result = coll.insert_one(doc! { "name": "FKA Twigs" }).await?;
//! assert_eq!(result.counts.inserted, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//! Server selection, connection pool, command and session events are emitted with
//! [`tracing`](https://docs.rs/tracing) under the `mongo_exec::server_selection`,
//! `mongo_exec::connection`, `mongo_exec::command` and `mongo_exec::session` targets.

#![warn(missing_docs)]

#[macro_use]
pub mod options;

pub use ::bson;

pub mod action;
mod bson_util;
mod client;
mod cmap;
mod coll;
mod concern;
mod cursor;
mod db;
pub mod error;
mod operation;
pub mod results;
pub mod sdam;
mod selection_criteria;
mod serde_util;
mod trace;

pub use crate::{
    client::{session::ClientSession, Client},
    cmap::establish::{AsyncReadWrite, AsyncStream, Connector, TcpConnector},
    coll::Collection,
    cursor::Cursor,
    db::Database,
};

pub use {client::session::ClusterTime, coll::Namespace};
