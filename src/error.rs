//! Contains the `Error` and `Result` types that `mongo_exec` uses.

#[cfg(test)]
mod test;

use std::{
    collections::HashSet,
    fmt::{self, Debug},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{bson::Document, options::ServerAddress, results::WriteResult};

/// Label attached to errors that allow a write to be retried.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// The result type for all methods that can return an error in the `mongo_exec` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `mongo_exec` crate. The inner [`ErrorKind`] is boxed to keep
/// `Result` small.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    labels: HashSet<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let Some(wc) = kind.get_write_concern_error() {
            labels.extend(wc.labels.clone());
        }
        Self {
            kind: Box::new(kind),
            labels,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn network_timeout() -> Error {
        ErrorKind::Io(Arc::new(std::io::ErrorKind::TimedOut.into())).into()
    }

    pub(crate) fn server_selection_timeout(message: impl Into<String>) -> Error {
        ErrorKind::ServerSelection {
            message: message.into(),
        }
        .into()
    }

    /// Whether this error is an I/O failure talking to a server.
    pub fn is_network_error(&self) -> bool {
        matches!(*self.kind, ErrorKind::Io(..))
    }

    /// Whether this error is a network error caused by an expired deadline.
    pub fn is_network_timeout(&self) -> bool {
        matches!(*self.kind, ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut)
    }

    /// Whether no suitable server could be found before the selection deadline.
    pub fn is_server_selection_error(&self) -> bool {
        matches!(*self.kind, ErrorKind::ServerSelection { .. })
    }

    /// Whether the connection pool could not produce a connection in time.
    pub fn is_pool_timeout(&self) -> bool {
        matches!(*self.kind, ErrorKind::ConnectionPoolTimeout { .. })
    }

    /// Whether this error came from a malformed server reply.
    pub fn is_invalid_response(&self) -> bool {
        matches!(*self.kind, ErrorKind::InvalidResponse { .. })
    }

    /// Whether the error was reported by the server rather than raised by the driver.
    pub(crate) fn is_server_error(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::Command(_) | ErrorKind::BulkWrite(_)
        )
    }

    /// Whether checking out a connection failed before anything was sent to the server.
    pub(crate) fn is_checkout_error(&self) -> bool {
        self.is_pool_timeout() || self.contains_label(CONNECTION_ESTABLISHMENT_LABEL)
    }

    /// The server-reported error code, if any.
    pub fn code(&self) -> Option<i32> {
        match *self.kind {
            ErrorKind::Command(ref err) => Some(err.code),
            ErrorKind::BulkWrite(ref failure) => failure
                .write_concern_error
                .as_ref()
                .map(|wc| wc.code)
                .or_else(|| failure.write_errors.first().map(|e| e.code)),
            _ => None,
        }
    }

    /// Returns the labels for this error.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error contains the specified label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels.contains(label.as_ref())
    }

    /// Adds the given label to this error.
    pub(crate) fn add_label<T: AsRef<str>>(&mut self, label: T) {
        self.labels.insert(label.as_ref().to_string());
    }

    /// The partial result of a write that failed for some of its items.
    pub fn partial_result(&self) -> Option<&WriteResult> {
        match *self.kind {
            ErrorKind::BulkWrite(ref failure) => failure.partial_result.as_ref(),
            _ => None,
        }
    }
}

/// Marks network errors raised while opening a new connection.
pub(crate) const CONNECTION_ESTABLISHMENT_LABEL: &str = "ConnectionEstablishmentError";

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Error::new(err.into(), None::<Option<String>>)
    }
}

impl From<bson::de::Error> for ErrorKind {
    fn from(err: bson::de::Error) -> Self {
        Self::InvalidResponse {
            message: err.to_string(),
        }
    }
}

impl From<bson::ser::Error> for ErrorKind {
    fn from(err: bson::ser::Error) -> Self {
        Self::InvalidArgument {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(err: std::io::ErrorKind) -> Self {
        Self::Io(Arc::new(err.into()))
    }
}

/// The types of errors that can occur.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided. Never reaches the network.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// No server matching the selection criteria became available before the deadline.
    #[error("{message}")]
    #[non_exhaustive]
    ServerSelection { message: String },

    /// The connection pool for a server had no connection available in time.
    #[error("Timed out while checking out a connection from the pool for {address}")]
    #[non_exhaustive]
    ConnectionPoolTimeout { address: ServerAddress },

    /// A transport-level failure while connecting, sending or receiving.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server returned a reply that could not be decoded.
    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// The server reported failure via `ok: 0`.
    #[error("Command failed: {0}")]
    Command(CommandError),

    /// A write was acknowledged but some of its items (or its write concern) failed.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    BulkWrite(BulkWriteFailure),

    /// The client was used after [`Client::shutdown`](crate::Client::shutdown).
    #[error("Client has been shut down")]
    Shutdown,

    /// A bug in the driver.
    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },
}

impl ErrorKind {
    fn get_write_concern_error(&self) -> Option<&WriteConcernError> {
        match self {
            ErrorKind::BulkWrite(BulkWriteFailure {
                write_concern_error,
                ..
            }) => write_concern_error.as_ref(),
            _ => None,
        }
    }
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    #[serde(default)]
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Error code {} ({}): {}",
            self.code, self.code_name, self.message
        )
    }
}

/// An error that occurred due to not being able to satisfy a write concern.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(alias = "errmsg", default = "String::new")]
    pub message: String,

    /// A document identifying the write concern setting related to the error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,

    #[serde(rename = "errorLabels", default)]
    pub(crate) labels: Vec<String>,
}

/// A single failed item of a write that carried several documents or statements.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IndexedWriteError {
    /// Index into the list of items that this error corresponds to.
    #[serde(default)]
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    /// A document providing more information about the write error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// The outcome of an acknowledged write in which some items failed. The items that succeeded are
/// still reported through `partial_result`.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BulkWriteFailure {
    /// The failed items, in the order reported by the server.
    pub write_errors: Vec<IndexedWriteError>,

    /// The error that occurred on account of write concern failure.
    pub write_concern_error: Option<WriteConcernError>,

    /// Counts and ids of the items that did succeed.
    pub partial_result: Option<WriteResult>,
}

impl BulkWriteFailure {
    /// Indexes of the failed items.
    pub fn failed_indexes(&self) -> Vec<usize> {
        self.write_errors.iter().map(|e| e.index).collect()
    }
}
