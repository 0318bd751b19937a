mod executor;
pub mod options;
pub mod session;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    cmap::{
        deadline_after,
        earliest,
        establish::{Connector, TcpConnector},
    },
    db::Database,
    error::{Error, ErrorKind, Result},
    operation::EndSessions,
    options::{
        ClientOptions,
        ConnectionPoolOptions,
        ReadPreference,
        SelectionCriteria,
        WriteConcern,
    },
    sdam::{ServerDescription, Topology, TopologyType, TopologyWatcher, SELECTION_BACKOFF},
    trace::{
        TracingRepresentation,
        SERVER_SELECTION_TRACING_EVENT_TARGET,
        SESSION_TRACING_EVENT_TARGET,
    },
    ClientSession,
};

use self::session::{
    ClusterTime,
    ClusterTimeTracker,
    ServerSession,
    ServerSessionPool,
    SessionOptions,
};

/// This is the main entry point for the API. A `Client` runs operations against the deployment
/// described by the topology snapshots it watches, keeping one connection pool per server.
///
/// `Client` uses [`std::sync::Arc`] internally, so it can safely be shared across threads or
/// async tasks. For example:
///
/// ```no_run
/// # use mongo_exec::{
/// #     bson::{doc, Document},
/// #     error::Result,
/// #     options::ClientOptions,
/// #     sdam::TopologyWatcher,
/// #     Client,
/// # };
/// # async fn start_workers(watcher: TopologyWatcher) -> Result<()> {
/// let client = Client::new(ClientOptions::default(), watcher)?;
///
/// for i in 0..5 {
///     let client_ref = client.clone();
///
///     tokio::task::spawn(async move {
///         let collection = client_ref
///             .database("items")
///             .collection::<Document>(&format!("coll{}", i));
///
///         // Do something with the collection
///     });
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Clean shutdown
/// Server sessions released by finished operations are pooled in the client. Call
/// [`Client::shutdown`] to end them on the server and close idle connections.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    topology: Topology,
    options: ClientOptions,
    session_pool: ServerSessionPool,
    cluster_time: ClusterTimeTracker,
    shutdown: AtomicBool,
}

impl Client {
    /// Creates a client that reads the deployment's state from `watcher` and connects to servers
    /// over TCP.
    pub fn new(options: ClientOptions, watcher: TopologyWatcher) -> Result<Self> {
        Self::with_connector(options, watcher, Arc::new(TcpConnector))
    }

    /// Creates a client that opens its connections through `connector`.
    pub fn with_connector(
        options: ClientOptions,
        watcher: TopologyWatcher,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        options.validate()?;
        let pool_options = ConnectionPoolOptions::from_client_options(&options);

        Ok(Self {
            inner: Arc::new(ClientInner {
                topology: Topology::new(watcher, connector, pool_options),
                options,
                session_pool: ServerSessionPool::new(),
                cluster_time: ClusterTimeTracker::default(),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Gets the default selection criteria the `Client` uses for operations.
    pub fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.options.selection_criteria.as_ref()
    }

    /// Gets the default write concern the `Client` uses for write operations.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.options.write_concern.as_ref()
    }

    /// Gets a handle to a database specified by `name` in the cluster the `Client` is connected
    /// to. The `Database` inherits the write concern and selection criteria of the client.
    ///
    /// This method does not send or receive anything across the wire to the database, so it can
    /// be used repeatedly without incurring any costs from I/O.
    pub fn database(&self, name: &str) -> Database {
        Database::new(self.clone(), name)
    }

    /// Starts a new explicit [`ClientSession`].
    pub fn start_session(
        &self,
        options: impl Into<Option<SessionOptions>>,
    ) -> Result<ClientSession> {
        self.check_not_shut_down()?;
        Ok(ClientSession::new(self.clone(), options.into(), false))
    }

    /// The highest cluster time this client has seen.
    pub fn cluster_time(&self) -> Option<ClusterTime> {
        self.inner.cluster_time.snapshot_for_outgoing()
    }

    /// Ends the pooled server sessions and closes idle connections. Operations started
    /// afterwards fail.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let session_ids = self.inner.session_pool.drain_session_ids();
        if !session_ids.is_empty() {
            let count = session_ids.len();
            if let Err(error) = self
                .execute_operation_unchecked(EndSessions::new(session_ids), None)
                .await
            {
                tracing::debug!(
                    target: SESSION_TRACING_EVENT_TARGET,
                    count,
                    error = %error.tracing_representation(),
                    "Failed to end pooled sessions",
                );
            }
        }

        self.inner.topology.shutdown();
    }

    pub(crate) fn check_out_server_session(&self) -> ServerSession {
        self.inner.session_pool.check_out()
    }

    pub(crate) fn check_in_server_session(&self, session: ServerSession) {
        self.inner.session_pool.check_in(session);
    }

    pub(crate) fn advance_cluster_time(&self, cluster_time: &ClusterTime) {
        self.inner.cluster_time.advance(cluster_time);
    }

    fn check_not_shut_down(&self) -> Result<()> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(ErrorKind::Shutdown.into());
        }
        Ok(())
    }

    /// Selects a server matching `criteria`, waiting for new topology snapshots until the
    /// selection timeout or `deadline`, whichever comes first.
    pub(crate) async fn select_server(
        &self,
        criteria: Option<&SelectionCriteria>,
        operation_name: &str,
        deadline: Option<Instant>,
    ) -> Result<(ServerDescription, TopologyType)> {
        let default_criteria;
        let criteria = match criteria.or(self.inner.options.selection_criteria.as_ref()) {
            Some(criteria) => criteria,
            None => {
                default_criteria = SelectionCriteria::ReadPreference(ReadPreference::Primary);
                &default_criteria
            }
        };

        let timeout = criteria
            .as_read_pref()
            .and_then(ReadPreference::server_selection_timeout)
            .unwrap_or_else(|| self.inner.options.server_selection_timeout());
        let selection_deadline = earliest(deadline_after(timeout), deadline);
        let local_threshold = self.inner.options.local_threshold();

        tracing::debug!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            selector = %criteria.tracing_representation(),
            operation = operation_name,
            "Server selection started",
        );
        let mut emitted_waiting_message = false;

        let mut watcher = self.inner.topology.watcher().clone();
        loop {
            let topology = watcher.clone_latest();
            if let Some(server) = topology.select_server(criteria, local_threshold) {
                tracing::debug!(
                    target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                    selector = %criteria.tracing_representation(),
                    operation = operation_name,
                    server = %server.address,
                    "Server selection succeeded",
                );
                return Ok((server.clone(), topology.topology_type));
            }

            let now = Instant::now();
            if selection_deadline.is_some_and(|selection_deadline| now >= selection_deadline) {
                let error = Error::server_selection_timeout(
                    topology.server_selection_timeout_error_message(criteria),
                );
                tracing::debug!(
                    target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                    selector = %criteria.tracing_representation(),
                    operation = operation_name,
                    topology_description = %topology.tracing_representation(),
                    failure = %error.tracing_representation(),
                    "Server selection failed",
                );
                return Err(error);
            }

            if !emitted_waiting_message {
                tracing::info!(
                    target: SERVER_SELECTION_TRACING_EVENT_TARGET,
                    selector = %criteria.tracing_representation(),
                    operation = operation_name,
                    remaining_time_ms = ?selection_deadline.map(|d| (d - now).as_millis()),
                    "Waiting for suitable server to become available",
                );
                emitted_waiting_message = true;
            }

            let backoff = selection_deadline
                .map_or(SELECTION_BACKOFF, |d| (d - now).min(SELECTION_BACKOFF));
            watcher.wait_for_update(backoff).await;
        }
    }
}
