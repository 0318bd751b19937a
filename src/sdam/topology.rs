
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::watch;

use crate::{
    cmap::{establish::Connector, ConnectionPool},
    options::{ConnectionPoolOptions, ServerAddress},
    sdam::TopologyDescription,
};

/// Creates the channel through which the monitoring collaborator publishes topology snapshots.
pub fn topology_channel(initial: TopologyDescription) -> (TopologyUpdater, TopologyWatcher) {
    let (sender, receiver) = watch::channel(initial);
    (TopologyUpdater { sender }, TopologyWatcher { receiver })
}

/// The publishing half of the topology channel.
#[derive(Debug)]
pub struct TopologyUpdater {
    sender: watch::Sender<TopologyDescription>,
}

impl TopologyUpdater {
    /// Replaces the current snapshot and wakes up any pending server selection.
    pub fn publish(&self, description: TopologyDescription) {
        self.sender.send_replace(description);
    }

    /// Applies `update` to a copy of the current snapshot and publishes the result.
    pub fn update(&self, update: impl FnOnce(&mut TopologyDescription)) {
        self.sender.send_modify(update);
    }

    /// A copy of the latest published snapshot.
    pub fn clone_latest(&self) -> TopologyDescription {
        self.sender.borrow().clone()
    }
}

/// The reading half of the topology channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TopologyWatcher {
    receiver: watch::Receiver<TopologyDescription>,
}

impl TopologyWatcher {
    /// A copy of the latest snapshot. Holding it never blocks the publisher.
    pub fn clone_latest(&mut self) -> TopologyDescription {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits until a new snapshot is published or `timeout` elapses. Returns whether a new
    /// snapshot arrived. Once the updater is gone this always waits out the full `timeout`.
    pub async fn wait_for_update(&mut self, timeout: Duration) -> bool {
        let receiver = &mut self.receiver;
        let changed = tokio::time::timeout(timeout, async {
            match receiver.changed().await {
                Ok(()) => true,
                Err(_) => std::future::pending().await,
            }
        })
        .await
        .unwrap_or(false);
        self.receiver.borrow_and_update();
        changed
    }
}

/// The client's view of the deployment: the snapshot watcher plus one connection pool per server
/// address. Each pool has its own lock; this map is locked only to look a pool up.
#[derive(Debug)]
pub(crate) struct Topology {
    watcher: TopologyWatcher,
    pools: Mutex<HashMap<ServerAddress, ConnectionPool>>,
    connector: Arc<dyn Connector>,
    pool_options: ConnectionPoolOptions,
}

impl Topology {
    pub(crate) fn new(
        watcher: TopologyWatcher,
        connector: Arc<dyn Connector>,
        pool_options: ConnectionPoolOptions,
    ) -> Self {
        Self {
            watcher,
            pools: Mutex::new(HashMap::new()),
            connector,
            pool_options,
        }
    }

    pub(crate) fn watcher(&self) -> &TopologyWatcher {
        &self.watcher
    }

    /// The pool for `address`, created on first use.
    pub(crate) fn pool(&self, address: &ServerAddress) -> ConnectionPool {
        let mut pools = self
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pools
            .entry(address.clone())
            .or_insert_with(|| {
                ConnectionPool::new(
                    address.clone(),
                    self.connector.clone(),
                    self.pool_options.clone(),
                )
            })
            .clone()
    }

    /// Closes every idle connection. Connections still checked out are closed when returned.
    pub(crate) fn shutdown(&self) {
        let pools: Vec<_> = self
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        for pool in pools {
            pool.close();
        }
    }
}
