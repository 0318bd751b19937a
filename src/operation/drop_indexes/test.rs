use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    cmap::StreamDescription,
    concern::WriteConcern,
    error::ErrorKind,
    operation::{test::handle_response_test, DropIndexes, Operation, Retryability},
    options::DropIndexOptions,
    Namespace,
};

#[test]
fn build() {
    let options = DropIndexOptions::builder()
        .max_time(Duration::from_secs(1))
        .write_concern(WriteConcern::majority())
        .build();
    let mut op = DropIndexes::new(
        Namespace::new("test_db", "test_coll"),
        "foo_1".to_string(),
        Some(options),
    )
    .unwrap();

    let cmd = op.build(&StreamDescription::new_testing()).unwrap();

    assert_eq!(cmd.name.as_str(), "dropIndexes");
    assert_eq!(cmd.target_db.as_str(), "test_db");
    assert_eq!(
        cmd.body,
        doc! {
            "dropIndexes": "test_coll",
            "index": "foo_1",
            "maxTimeMS": 1000,
            "writeConcern": { "w": "majority" },
        }
    );
    assert_eq!(op.retryability(), Retryability::None);
}

#[test]
fn wildcard_is_rejected() {
    let error = DropIndexes::new(Namespace::new("db", "coll"), "*".to_string(), None).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn handle_success() {
    let op = DropIndexes::new(Namespace::new("db", "coll"), "foo_1".to_string(), None).unwrap();
    handle_response_test(&op, doc! { "ok": 1, "nIndexesWas": 2 }).unwrap();
}

#[test]
fn handle_write_concern_error() {
    let op = DropIndexes::new(Namespace::new("db", "coll"), "foo_1".to_string(), None).unwrap();
    let error = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "writeConcernError": {
                "code": 64,
                "codeName": "WriteConcernFailed",
                "errmsg": "waiting for replication timed out",
            },
        },
    )
    .unwrap_err();
    assert_eq!(error.code(), Some(64));
}
