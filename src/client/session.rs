mod cluster_time;
mod pool;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::cluster_time::ClusterTime;
pub(crate) use self::{cluster_time::ClusterTimeTracker, pool::ServerSessionPool};
use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document, Timestamp},
    error::{Error, Result},
    operation::EndSessions,
    trace::SESSION_TRACING_EVENT_TARGET,
    Client,
};

/// Options for a [`ClientSession`].
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct SessionOptions {
    /// Whether reads in this session observe the writes and reads that preceded them in the same
    /// session. Defaults to true.
    pub causal_consistency: Option<bool>,
}

/// A logical session. Operations run with the same session are associated on the server through
/// its `lsid`, and the session tracks the cluster and operation times it has observed.
///
/// `ClientSession` is a handle and can be cloned and shared between tasks; every clone refers to
/// the same session. Explicit sessions are started with [`Client::start_session`] and should be
/// ended with [`ClientSession::end`]. A session that is dropped without being ended returns its
/// server session to the client's pool for reuse.
///
/// ```no_run
/// # use mongo_exec::{bson::doc, Client, error::Result};
/// # async fn run(client: Client) -> Result<()> {
/// let session = client.start_session(None)?;
/// let coll = client.database("db").collection("coll");
/// coll.insert_one(doc! { "x": 1 }).session(&session).await?;
/// let doc = coll.find_one(doc! { "x": 1 }).session(&session).await?;
/// session.end().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    client: Client,
    id: Document,
    is_implicit: bool,
    causal_consistency: bool,
    cluster_time: ClusterTimeTracker,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    server_session: ServerSession,
    operation_time: Option<Timestamp>,
    ended: bool,
}

impl ClientSession {
    pub(crate) fn new(client: Client, options: Option<SessionOptions>, is_implicit: bool) -> Self {
        let server_session = client.check_out_server_session();
        let causal_consistency = options
            .and_then(|options| options.causal_consistency)
            .unwrap_or(!is_implicit);
        tracing::trace!(
            target: SESSION_TRACING_EVENT_TARGET,
            implicit = is_implicit,
            causal_consistency,
            "Session started",
        );
        Self {
            inner: Arc::new(SessionInner {
                client,
                id: server_session.id.clone(),
                is_implicit,
                causal_consistency,
                cluster_time: ClusterTimeTracker::default(),
                state: Mutex::new(SessionState {
                    server_session,
                    operation_time: None,
                    ended: false,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The client used to start this session.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// The id of this session, sent to the server as `lsid`.
    pub fn id(&self) -> &Document {
        &self.inner.id
    }

    /// The highest cluster time this session has seen.
    pub fn cluster_time(&self) -> Option<ClusterTime> {
        self.inner.cluster_time.snapshot_for_outgoing()
    }

    /// Advances the cluster time of this session. Has no effect if `to` is not newer than the
    /// current one.
    pub fn advance_cluster_time(&self, to: &ClusterTime) {
        self.inner.cluster_time.advance(to);
    }

    /// The operation time of the latest operation run in this session.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.state().operation_time
    }

    /// Advances the operation time of this session. Has no effect if `ts` is not newer than the
    /// current one.
    pub fn advance_operation_time(&self, ts: Timestamp) {
        let mut state = self.state();
        let newer = state
            .operation_time
            .is_none_or(|current| (current.time, current.increment) < (ts.time, ts.increment));
        if newer {
            state.operation_time = Some(ts);
        }
    }

    /// Whether reads in this session wait for the latest operation time seen by the session.
    pub fn is_causally_consistent(&self) -> bool {
        self.inner.causal_consistency
    }

    /// Whether [`ClientSession::end`] has been called.
    pub fn is_ended(&self) -> bool {
        self.state().ended
    }

    /// Ends the session, releasing it on the server. Using the session afterwards is an error.
    pub async fn end(&self) -> Result<()> {
        let id = {
            let mut state = self.state();
            if state.ended {
                return Ok(());
            }
            state.ended = true;
            state.server_session.id.clone()
        };
        tracing::trace!(target: SESSION_TRACING_EVENT_TARGET, "Session ended");
        self.inner
            .client
            .execute_operation(EndSessions::new(vec![id]), None)
            .await
    }

    pub(crate) fn is_implicit(&self) -> bool {
        self.inner.is_implicit
    }

    /// Fails if the session has been ended.
    pub(crate) fn check_active(&self) -> Result<()> {
        if self.state().ended {
            return Err(Error::invalid_argument("cannot use a session that has been ended"));
        }
        Ok(())
    }

    /// Returns the next transaction number, used to make a single write retryable.
    pub(crate) fn get_and_increment_txn_number(&self) -> i64 {
        let mut state = self.state();
        state.server_session.txn_number += 1;
        state.server_session.txn_number
    }

    /// Records that a network error occurred while this session was in use. The server session
    /// is discarded rather than pooled.
    pub(crate) fn mark_dirty(&self) {
        self.state().server_session.dirty = true;
    }

    pub(crate) fn update_last_use(&self) {
        self.state().server_session.last_use = Instant::now();
    }

    #[cfg(test)]
    pub(crate) fn txn_number(&self) -> i64 {
        self.state().server_session.txn_number
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.state().server_session.dirty
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.ended {
            self.client
                .check_in_server_session(state.server_session.clone());
        }
    }
}

/// The server side of a session. These are pooled and may back many `ClientSession`s over their
/// lifetime.
#[derive(Clone, Debug)]
pub(crate) struct ServerSession {
    /// The id of the server session to which this corresponds.
    pub(crate) id: Document,

    /// The last time an operation was executed with this session.
    last_use: Instant,

    /// Whether a network error was encountered while using this session.
    pub(crate) dirty: bool,

    /// A monotonically increasing transaction number for this session.
    txn_number: i64,
}

impl ServerSession {
    /// Creates a new session with a random UUID id.
    fn new() -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });

        Self {
            id: doc! { "id": binary },
            last_use: Instant::now(),
            dirty: false,
            txn_number: 0,
        }
    }

    /// Whether the server will time this session out within the next minute.
    fn is_about_to_expire(&self, logical_session_timeout: Duration) -> bool {
        match self.last_use.checked_add(logical_session_timeout) {
            Some(expiration_date) => expiration_date < Instant::now() + Duration::from_secs(60),
            None => false,
        }
    }
}
