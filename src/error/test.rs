use std::io;

use pretty_assertions::assert_eq;

use super::{
    BulkWriteFailure,
    CommandError,
    Error,
    ErrorKind,
    IndexedWriteError,
    WriteConcernError,
    CONNECTION_ESTABLISHMENT_LABEL,
    RETRYABLE_WRITE_ERROR,
};
use crate::{
    bson::doc,
    options::ServerAddress,
};

fn write_error(index: usize, code: i32) -> IndexedWriteError {
    crate::bson::from_document(doc! {
        "index": index as i64,
        "code": code,
        "errmsg": "failed",
    })
    .unwrap()
}

fn write_concern_error(labels: Vec<&str>) -> WriteConcernError {
    crate::bson::from_document(doc! {
        "code": 64,
        "codeName": "WriteConcernFailed",
        "errmsg": "waiting for replication timed out",
        "errInfo": { "wtimeout": true },
        "errorLabels": labels,
    })
    .unwrap()
}

#[test]
fn command_error_code() {
    let error: Error = ErrorKind::Command(CommandError {
        code: 11600,
        code_name: "InterruptedAtShutdown".to_string(),
        message: "interrupted".to_string(),
    })
    .into();
    assert_eq!(error.code(), Some(11600));
    assert!(error.is_server_error());
    assert!(!error.is_network_error());
    assert!(error.labels().is_empty());
    assert_eq!(
        error.kind.to_string(),
        "Command failed: Error code 11600 (InterruptedAtShutdown): interrupted"
    );
}

#[test]
fn command_error_from_reply() {
    let parsed: CommandError =
        crate::bson::from_document(doc! { "ok": 0, "errmsg": "bad" }).unwrap();
    assert_eq!(parsed.code, 0);
    assert_eq!(parsed.code_name, "");
    assert_eq!(parsed.message, "bad");
}

#[test]
fn write_failure_code_prefers_write_concern() {
    let failure = BulkWriteFailure {
        write_errors: vec![write_error(0, 11000)],
        write_concern_error: Some(write_concern_error(Vec::new())),
        partial_result: None,
    };
    let error: Error = ErrorKind::BulkWrite(failure).into();
    assert_eq!(error.code(), Some(64));

    let failure = BulkWriteFailure {
        write_errors: vec![write_error(2, 11000), write_error(5, 121)],
        ..Default::default()
    };
    assert_eq!(failure.failed_indexes(), vec![2, 5]);
    let error: Error = ErrorKind::BulkWrite(failure).into();
    assert_eq!(error.code(), Some(11000));
    assert!(error.is_server_error());
}

#[test]
fn write_concern_labels_are_lifted() {
    let failure = BulkWriteFailure {
        write_concern_error: Some(write_concern_error(vec![RETRYABLE_WRITE_ERROR])),
        ..Default::default()
    };
    let error = Error::new(
        ErrorKind::BulkWrite(failure),
        Some(vec!["Other".to_string()]),
    );
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    assert!(error.contains_label("Other"));
    assert_eq!(error.labels().len(), 2);
}

#[test]
fn write_concern_error_details() {
    let wc = write_concern_error(Vec::new());
    assert_eq!(wc.code_name, "WriteConcernFailed");
    assert_eq!(wc.message, "waiting for replication timed out");
    assert_eq!(wc.details, Some(doc! { "wtimeout": true }));
}

#[test]
fn labels_can_be_added() {
    let mut error = Error::internal("boom");
    assert!(!error.contains_label(RETRYABLE_WRITE_ERROR));
    error.add_label(RETRYABLE_WRITE_ERROR);
    error.add_label(RETRYABLE_WRITE_ERROR);
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    assert_eq!(error.labels().len(), 1);
}

#[test]
fn network_errors() {
    let error: Error = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
    assert!(error.is_network_error());
    assert!(!error.is_network_timeout());
    assert!(!error.is_server_error());
    assert_eq!(error.code(), None);

    let timeout = Error::network_timeout();
    assert!(timeout.is_network_error());
    assert!(timeout.is_network_timeout());

    let from_kind: Error = io::ErrorKind::BrokenPipe.into();
    assert!(from_kind.is_network_error());
}

#[test]
fn checkout_errors() {
    let pool_timeout: Error = ErrorKind::ConnectionPoolTimeout {
        address: ServerAddress::new("localhost", 27017),
    }
    .into();
    assert!(pool_timeout.is_pool_timeout());
    assert!(pool_timeout.is_checkout_error());
    assert_eq!(
        pool_timeout.kind.to_string(),
        "Timed out while checking out a connection from the pool for localhost:27017"
    );

    let mut refused: Error = io::ErrorKind::ConnectionRefused.into();
    assert!(!refused.is_checkout_error());
    refused.add_label(CONNECTION_ESTABLISHMENT_LABEL);
    assert!(refused.is_checkout_error());
}

#[test]
fn bson_errors() {
    let de_error: Error = crate::bson::from_document::<CommandError>(doc! { "code": "x" })
        .unwrap_err()
        .into();
    assert!(de_error.is_invalid_response());

    let ser_error: Error = crate::bson::to_document(&1_i32).unwrap_err().into();
    assert!(matches!(*ser_error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn selection_and_response_errors() {
    let selection = Error::server_selection_timeout("nothing matched");
    assert!(selection.is_server_selection_error());
    assert_eq!(selection.kind.to_string(), "nothing matched");

    let response = Error::invalid_response("short frame");
    assert!(response.is_invalid_response());
    assert!(!response.is_server_error());
    assert!(response.partial_result().is_none());
}

#[test]
fn shutdown() {
    let error: Error = ErrorKind::Shutdown.into();
    assert_eq!(error.kind.to_string(), "Client has been shut down");
    assert!(!error.is_network_error());
}

#[test]
fn errors_are_cloneable_and_sendable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Error>();

    let error: Error = io::Error::other("x").into();
    let clone = error.clone();
    assert!(clone.is_network_error());
}
