
pub(crate) mod conn;
pub(crate) mod establish;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
    time::{Duration, Instant},
};

use derive_where::derive_where;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) use self::conn::{
    Command,
    Connection,
    FramingOptions,
    RawCommandResponse,
    StreamDescription,
    WireMessage,
    WireShape,
};
use self::establish::Connector;
use crate::{
    bson::Document,
    error::{Error, ErrorKind, Result, CONNECTION_ESTABLISHMENT_LABEL},
    options::{
        ConnectionPoolOptions,
        ServerAddress,
        DEFAULT_CONNECT_TIMEOUT,
        DEFAULT_MAX_MESSAGE_SIZE_BYTES,
        DEFAULT_MAX_POOL_SIZE,
    },
    sdam::ServerDescription,
    trace::CONNECTION_TRACING_EVENT_TARGET,
};

/// The connections to a single server. Callers queue in FIFO order for one of `max_pool_size`
/// slots; a slot is then filled with an idle connection or a freshly established one.
///
/// This type is a handle to shared state and is cheap to clone.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

#[derive_where(Debug)]
struct PoolInner {
    address: ServerAddress,

    #[derive_where(skip)]
    connector: Arc<dyn Connector>,

    max_pool_size: u32,
    max_idle_time: Option<Duration>,
    wait_queue_timeout: Option<Duration>,
    connect_timeout: Duration,
    max_message_size_bytes: i32,

    /// One permit per connection slot. Tokio's semaphore is fair, which makes waiting checkouts
    /// FIFO.
    wait_queue: Arc<Semaphore>,

    state: Mutex<PoolState>,
    next_connection_id: AtomicU32,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Idle connections, oldest first.
    available: VecDeque<Connection>,

    /// Idle plus checked out plus being established.
    total_connection_count: u32,

    generation: u32,
    closed: bool,
}

impl ConnectionPool {
    pub(crate) fn new(
        address: ServerAddress,
        connector: Arc<dyn Connector>,
        options: ConnectionPoolOptions,
    ) -> Self {
        let max_pool_size = options.max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE);
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %address,
            max_pool_size,
            "Connection pool created",
        );
        Self {
            inner: Arc::new(PoolInner {
                address,
                connector,
                max_pool_size,
                max_idle_time: options.max_idle_time,
                wait_queue_timeout: options.wait_queue_timeout,
                connect_timeout: options.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
                max_message_size_bytes: options
                    .max_message_size_bytes
                    .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE_BYTES),
                wait_queue: Arc::new(Semaphore::new(max_pool_size as usize)),
                state: Mutex::new(PoolState::default()),
                next_connection_id: AtomicU32::new(1),
            }),
        }
    }

    /// Checks out a connection to `server`. Waits in the queue for at most `waitQueueTimeout`,
    /// bounded by `deadline`, then reuses the oldest healthy idle connection or opens a new one.
    pub(crate) async fn check_out(
        &self,
        server: &ServerDescription,
        deadline: Option<Instant>,
    ) -> Result<PooledConnection> {
        let inner = &self.inner;
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %inner.address,
            "Connection checkout started",
        );

        let permit = match self.acquire_permit(deadline).await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::debug!(
                    target: CONNECTION_TRACING_EVENT_TARGET,
                    server = %inner.address,
                    reason = "timeout",
                    "Connection checkout failed",
                );
                return Err(e);
            }
        };

        let mut connection = match self.take_available() {
            Some(connection) => connection,
            None => self.establish(deadline).await?,
        };
        connection.stream_description = Some(StreamDescription::from_server(
            server,
            inner.max_message_size_bytes,
        ));

        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %inner.address,
            driver_connection_id = connection.id,
            "Connection checked out",
        );
        Ok(PooledConnection {
            connection: Some(connection),
            pool: inner.clone(),
            _permit: permit,
        })
    }

    async fn acquire_permit(&self, deadline: Option<Instant>) -> Result<OwnedSemaphorePermit> {
        let inner = &self.inner;
        let wait_deadline = earliest(
            inner.wait_queue_timeout.and_then(deadline_after),
            deadline,
        );
        let acquire = inner.wait_queue.clone().acquire_owned();
        let permit = match wait_deadline {
            Some(wait_deadline) => {
                tokio::time::timeout_at(tokio::time::Instant::from_std(wait_deadline), acquire)
                    .await
                    .map_err(|_| self.timeout_error())?
            }
            None => acquire.await,
        };
        permit.map_err(|_| {
            Error::internal(format!("connection pool for {} is closed", inner.address))
        })
    }

    /// Pops the oldest idle connection that is still usable, closing stale and idle ones along the
    /// way. Reserves a slot in the total count when none is available.
    fn take_available(&self) -> Option<Connection> {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        while let Some(connection) = state.available.pop_front() {
            if connection.generation != state.generation {
                state.close(connection, &inner.address, "stale");
                continue;
            }
            if connection.is_idle(inner.max_idle_time) {
                state.close(connection, &inner.address, "idle");
                continue;
            }
            return Some(connection);
        }
        state.total_connection_count += 1;
        None
    }

    async fn establish(&self, deadline: Option<Instant>) -> Result<Connection> {
        let inner = &self.inner;
        let id = inner.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let generation = inner.lock_state().generation;
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %inner.address,
            driver_connection_id = id,
            "Connection created",
        );

        let mut slot = ReservedSlot { pool: inner, reserved: true };
        let connect_deadline = earliest(deadline_after(inner.connect_timeout), deadline);
        let connect = inner.connector.connect(&inner.address);
        let result = match connect_deadline {
            Some(connect_deadline) => {
                tokio::time::timeout_at(tokio::time::Instant::from_std(connect_deadline), connect)
                    .await
                    .unwrap_or_else(|_| Err(std::io::ErrorKind::TimedOut.into()))
            }
            None => connect.await,
        };

        match result {
            Ok(stream) => {
                slot.reserved = false;
                Ok(Connection::new(id, inner.address.clone(), generation, stream))
            }
            Err(e) => {
                tracing::debug!(
                    target: CONNECTION_TRACING_EVENT_TARGET,
                    server = %inner.address,
                    driver_connection_id = id,
                    error = %e,
                    "Connection establishment failed",
                );
                Err(Error::new(
                    ErrorKind::from(e),
                    Some([CONNECTION_ESTABLISHMENT_LABEL.to_string()]),
                ))
            }
        }
    }

    fn timeout_error(&self) -> Error {
        ErrorKind::ConnectionPoolTimeout {
            address: self.inner.address.clone(),
        }
        .into()
    }

    /// Invalidates every connection created so far. Idle ones are closed now, checked out ones
    /// when they are returned.
    pub(crate) fn clear(&self, cause: &Error) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        state.generation += 1;
        while let Some(connection) = state.available.pop_front() {
            state.close(connection, &inner.address, "stale");
        }
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %inner.address,
            generation = state.generation,
            error = %cause,
            "Connection pool cleared",
        );
    }

    /// Closes the pool. Waiting and future checkouts fail.
    pub(crate) fn close(&self) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        state.closed = true;
        while let Some(connection) = state.available.pop_front() {
            state.close(connection, &inner.address, "poolClosed");
        }
        inner.wait_queue.close();
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %inner.address,
            "Connection pool closed",
        );
    }

    #[cfg(test)]
    pub(crate) fn total_connection_count(&self) -> u32 {
        self.inner.lock_state().total_connection_count
    }

    #[cfg(test)]
    pub(crate) fn available_connection_count(&self) -> usize {
        self.inner.lock_state().available.len()
    }
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_in(&self, mut connection: Connection) {
        let mut state = self.lock_state();
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %self.address,
            driver_connection_id = connection.id,
            "Connection checked in",
        );
        if connection.is_broken() {
            state.close(connection, &self.address, "error");
        } else if state.closed {
            state.close(connection, &self.address, "poolClosed");
        } else if connection.generation != state.generation {
            state.close(connection, &self.address, "stale");
        } else {
            connection.mark_as_available();
            state.available.push_back(connection);
        }
    }
}

impl PoolState {
    fn close(&mut self, connection: Connection, address: &ServerAddress, reason: &'static str) {
        self.total_connection_count = self.total_connection_count.saturating_sub(1);
        tracing::debug!(
            target: CONNECTION_TRACING_EVENT_TARGET,
            server = %address,
            driver_connection_id = connection.id,
            reason,
            "Connection closed",
        );
    }
}

/// A slot counted in `total_connection_count` for a connection still being established. Released
/// if establishment fails or the checkout is cancelled.
struct ReservedSlot<'a> {
    pool: &'a PoolInner,
    reserved: bool,
}

impl Drop for ReservedSlot<'_> {
    fn drop(&mut self) {
        if self.reserved {
            let mut state = self.pool.lock_state();
            state.total_connection_count = state.total_connection_count.saturating_sub(1);
        }
    }
}

/// A connection checked out of a pool. Dropping it returns the connection to the pool, or closes
/// it if an exchange on it failed, and then frees its slot in the wait queue.
#[derive(Debug)]
pub(crate) struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| Error::internal("pooled connection used after check in"))
    }

    pub(crate) fn id(&self) -> u32 {
        self.connection.as_ref().map_or(0, |c| c.id)
    }

    pub(crate) fn stream_description(&self) -> Result<&StreamDescription> {
        self.connection()?.stream_description()
    }

    pub(crate) async fn send_message(
        &mut self,
        message: WireMessage,
        deadline: Option<Instant>,
    ) -> Result<Option<Document>> {
        match self.connection.as_mut() {
            Some(connection) => connection.send_message(message, deadline).await,
            None => Err(Error::internal("pooled connection used after check in")),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.check_in(connection);
        }
    }
}

/// The instant `timeout` from now, or `None` when that is too far out to represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
