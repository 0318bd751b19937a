use std::{sync::Arc, time::Instant};

use super::{Client, ClientSession};
use crate::{
    cmap::{
        deadline_after,
        FramingOptions,
        PooledConnection,
        RawCommandResponse,
        StreamDescription,
        WireMessage,
        WireShape,
    },
    cursor::{Cursor, CursorSpecification},
    error::{Error, Result, RETRYABLE_WRITE_ERROR},
    operation::{Operation, Retryability},
    options::{ReadPreference, ReadPreferenceOptions, SelectionCriteria},
    sdam::{ServerType, TopologyType},
    trace::{TracingRepresentation, COMMAND_TRACING_EVENT_TARGET},
};

impl Client {
    /// Execute the given operation.
    ///
    /// Server selection will be performed using the criteria specified on the operation, if any,
    /// and an implicit session will be created if the operation and write concern are compatible
    /// with sessions and an explicit session is not provided.
    pub(crate) async fn execute_operation<T: Operation>(
        &self,
        op: T,
        session: Option<&ClientSession>,
    ) -> Result<T::O> {
        self.check_not_shut_down()?;
        self.execute_operation_unchecked(op, session).await
    }

    /// Execute the given operation, returning the cursor created by the operation. The cursor
    /// keeps the session it was opened with, creating an implicit one if none was provided.
    pub(crate) async fn execute_cursor_operation<Op, T>(
        &self,
        op: Op,
        session: Option<&ClientSession>,
    ) -> Result<Cursor<T>>
    where
        Op: Operation<O = CursorSpecification>,
    {
        self.check_not_shut_down()?;
        let session = match session {
            Some(session) => session.clone(),
            None => ClientSession::new(self.clone(), None, true),
        };
        let spec = self.execute_operation_unchecked(op, Some(&session)).await?;
        Ok(Cursor::new(self.clone(), spec, Some(session)))
    }

    pub(super) async fn execute_operation_unchecked<T: Operation>(
        &self,
        op: T,
        session: Option<&ClientSession>,
    ) -> Result<T::O> {
        let deadline = op
            .timeout()
            .or(self.inner.options.timeout)
            .and_then(deadline_after);

        if let Some(session) = session {
            if !Arc::ptr_eq(&self.inner, &session.client().inner) {
                return Err(Error::invalid_argument(
                    "the session provided to an operation must be created from the same client as \
                     the collection/database on which the operation is being performed",
                ));
            }
            session.check_active()?;
            if !session.is_implicit() && !op.is_acknowledged() {
                return Err(Error::invalid_argument(
                    "Cannot use ClientSessions with unacknowledged write concern",
                ));
            }
            if !session.is_implicit() && !op.supports_sessions() {
                return Err(Error::invalid_argument(format!(
                    "{} does not support sessions",
                    op.name()
                )));
            }
        }

        let implicit_session;
        let session = match session {
            Some(session) => Some(session),
            None if op.supports_sessions() && op.is_acknowledged() => {
                implicit_session = ClientSession::new(self.clone(), None, true);
                Some(&implicit_session)
            }
            None => None,
        };

        self.execute_operation_with_retry(op, session, deadline)
            .await
    }

    /// Selects a server and executes the given operation on it. A retryable operation that fails
    /// to check out a connection, or hits a network error, is run once more from server
    /// selection; the error of the last attempt is returned.
    async fn execute_operation_with_retry<T: Operation>(
        &self,
        mut op: T,
        session: Option<&ClientSession>,
        deadline: Option<Instant>,
    ) -> Result<T::O> {
        let mut retry: Option<ExecutionRetry> = None;

        loop {
            if retry.is_some() {
                op.update_for_retry();
            }

            let (server, topology_type) = self
                .select_server(op.selection_criteria(), op.name(), deadline)
                .await?;
            let pool = self.inner.topology.pool(&server.address);

            let mut connection = match pool.check_out(&server, deadline).await {
                Ok(connection) => connection,
                Err(mut err) => {
                    let retryability = self.get_retryability(&op, None);
                    if retryability == Retryability::Write {
                        err.add_label(RETRYABLE_WRITE_ERROR);
                    }
                    if retry.is_none() && can_retry_error(&err, retryability, deadline) {
                        retry = Some(ExecutionRetry {
                            prior_txn_number: None,
                            first_error: err,
                        });
                        continue;
                    }
                    return Err(err);
                }
            };

            let retryability = self.get_retryability(&op, Some(connection.stream_description()?));
            if retryability == Retryability::None {
                // A write already sent with a txnNumber is never resent without one.
                if let Some(retry) = retry.take_if(|r| r.prior_txn_number.is_some()) {
                    return Err(retry.first_error);
                }
            }

            let txn_number = match retry.as_ref().and_then(|r| r.prior_txn_number) {
                Some(txn_number) => Some(txn_number),
                None if retryability == Retryability::Write => {
                    session.map(ClientSession::get_and_increment_txn_number)
                }
                None => None,
            };

            let result = self
                .execute_operation_on_connection(
                    &mut op,
                    &mut connection,
                    session,
                    txn_number,
                    topology_type,
                    deadline,
                )
                .await;

            match result {
                Ok(output) => return Ok(output),
                Err(mut err) => {
                    if err.is_network_error() {
                        if let Some(session) = session {
                            session.mark_dirty();
                        }
                        if !err.is_network_timeout() {
                            pool.clear(&err);
                        }
                        if retryability == Retryability::Write {
                            err.add_label(RETRYABLE_WRITE_ERROR);
                        }
                    }
                    // release the connection to be processed by the connection pool
                    drop(connection);

                    if retry.is_none() && can_retry_error(&err, retryability, deadline) {
                        retry = Some(ExecutionRetry {
                            prior_txn_number: txn_number,
                            first_error: err,
                        });
                        continue;
                    }
                    return op.handle_error(err);
                }
            }
        }
    }

    /// Executes an operation on a given connection, optionally using a provided session.
    async fn execute_operation_on_connection<T: Operation>(
        &self,
        op: &mut T,
        connection: &mut PooledConnection,
        session: Option<&ClientSession>,
        txn_number: Option<i64>,
        topology_type: TopologyType,
        deadline: Option<Instant>,
    ) -> Result<T::O> {
        let description = connection.stream_description()?.clone();
        let shape = description.wire_shape();
        let mut cmd = op.build(&description)?;

        let read_preference = op
            .selection_criteria()
            .or(self.inner.options.selection_criteria.as_ref())
            .and_then(SelectionCriteria::as_read_pref);
        let non_primary = read_preference.is_some_and(|rp| *rp != ReadPreference::Primary);
        let is_mongos = description.server_type == ServerType::Mongos;

        match read_preference {
            Some(read_preference) if is_mongos && non_primary => {
                cmd.set_read_preference(read_preference.clone());
            }
            _ if shape == WireShape::GenericCommand
                && topology_type == TopologyType::Single
                && !is_mongos =>
            {
                cmd.set_read_preference(ReadPreference::PrimaryPreferred {
                    options: ReadPreferenceOptions::default(),
                });
            }
            _ => {}
        }

        if let Some(session) = session {
            if description.supports_sessions() && op.supports_sessions() && op.is_acknowledged() {
                cmd.set_session(session.id().clone());
                if let Some(txn_number) = txn_number {
                    cmd.set_txn_number(txn_number);
                }
                if session.is_causally_consistent() && op.supports_read_concern() {
                    if let Some(operation_time) = session.operation_time() {
                        cmd.set_after_cluster_time(operation_time);
                    }
                }
                session.update_last_use();
            } else if !session.is_implicit() && !description.supports_sessions() {
                return Err(Error::invalid_argument(format!(
                    "sessions are not supported by the server at {}",
                    description.server_address
                )));
            }
        }

        let session_cluster_time = session.and_then(ClientSession::cluster_time);
        if let Some(cluster_time) = std::cmp::max(session_cluster_time, self.cluster_time()) {
            cmd.set_cluster_time(&cluster_time);
        }

        let framing = FramingOptions {
            secondary_ok: shape == WireShape::Legacy
                && (non_primary || topology_type == TopologyType::Single),
            more_to_come: shape == WireShape::GenericCommand && !op.is_acknowledged(),
        };
        let message = WireMessage::build(&cmd, shape, framing)?;
        let request_id = message.request_id();
        let connection_id = connection.id();

        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            command = %cmd.to_document().tracing_representation(),
            database_name = %cmd.target_db,
            command_name = %cmd.name,
            request_id,
            driver_connection_id = connection_id,
            server = %description.server_address,
            "Command started",
        );

        let start_time = Instant::now();
        let result = connection.send_message(message, deadline).await;
        let duration = start_time.elapsed();

        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    command_name = %cmd.name,
                    request_id,
                    driver_connection_id = connection_id,
                    duration_ms = duration.as_millis(),
                    reply = "{ \"ok\": 1 }",
                    "Command succeeded",
                );
                return op.handle_unacknowledged();
            }
            Err(error) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    command_name = %cmd.name,
                    request_id,
                    driver_connection_id = connection_id,
                    duration_ms = duration.as_millis(),
                    failure = %error.tracing_representation(),
                    "Command failed",
                );
                return Err(error);
            }
        };

        let response = RawCommandResponse::new(description.server_address.clone(), reply);
        self.update_cluster_time(&response, session);

        if !response.is_success() {
            let error = response.command_error();
            tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                command_name = %cmd.name,
                request_id,
                driver_connection_id = connection_id,
                duration_ms = duration.as_millis(),
                failure = %error.tracing_representation(),
                "Command failed",
            );
            return Err(error);
        }

        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            command_name = %cmd.name,
            request_id,
            driver_connection_id = connection_id,
            duration_ms = duration.as_millis(),
            reply = %response.raw.tracing_representation(),
            "Command succeeded",
        );

        if !op.is_acknowledged() {
            return op.handle_unacknowledged();
        }
        op.handle_response(response, &description)
    }

    /// Returns the retryability level for the execution of this operation against a server with
    /// the given stream description. Without a description (the checkout failed) retryable kinds
    /// keep their level.
    fn get_retryability<T: Operation>(
        &self,
        op: &T,
        stream_description: Option<&StreamDescription>,
    ) -> Retryability {
        let options = &self.inner.options;
        match op.retryability() {
            Retryability::Read if options.retry_reads() => Retryability::Read,
            Retryability::Write if options.retry_writes() && op.is_acknowledged() => {
                match stream_description {
                    Some(description) if !description.supports_retryable_writes() => {
                        Retryability::None
                    }
                    _ => Retryability::Write,
                }
            }
            _ => Retryability::None,
        }
    }

    /// Advances the client's and the session's clock from a reply, whether or not it reports
    /// success.
    fn update_cluster_time(&self, response: &RawCommandResponse, session: Option<&ClientSession>) {
        if let Some(ref cluster_time) = response.cluster_time() {
            self.advance_cluster_time(cluster_time);
            if let Some(session) = session {
                session.advance_cluster_time(cluster_time);
            }
        }

        if let (Some(session), Some(operation_time)) = (session, response.operation_time()) {
            session.advance_operation_time(operation_time);
        }
    }
}

/// Only network and checkout failures are retried, and never once the deadline has passed.
fn can_retry_error(error: &Error, retryability: Retryability, deadline: Option<Instant>) -> bool {
    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        return false;
    }
    match retryability {
        Retryability::Read | Retryability::Write => {
            error.is_network_error() || error.is_checkout_error()
        }
        Retryability::None => false,
    }
}

#[derive(Debug)]
struct ExecutionRetry {
    prior_txn_number: Option<i64>,
    first_error: Error,
}
