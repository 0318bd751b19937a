use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    cmap::StreamDescription,
    concern::{Acknowledgment, WriteConcern},
    error::ErrorKind,
    operation::{test::handle_response_test, Operation, Retryability, Update, UpdateOrReplace},
    options::{Hint, UpdateModifications, UpdateOptions},
    Namespace,
};

fn update(multi: bool, options: Option<UpdateOptions>) -> Update {
    Update::new(
        Namespace::new("test_db", "test_coll"),
        doc! { "x": { "$gt": 1 } },
        UpdateOrReplace::UpdateModifications(doc! { "$inc": { "x": 1 } }.into()),
        multi,
        options,
    )
    .unwrap()
}

#[test]
fn build() {
    let mut op = update(
        false,
        Some(UpdateOptions {
            upsert: Some(false),
            bypass_document_validation: Some(true),
            write_concern: Some(WriteConcern::builder().w(Acknowledgment::Majority).build()),
            array_filters: Some(vec![doc! { "y": 1 }]),
            hint: Some(Hint::Name("x_1".to_string())),
            ..Default::default()
        }),
    );

    let cmd = op.build(&StreamDescription::new_testing()).unwrap();

    assert_eq!(cmd.name.as_str(), "update");
    assert_eq!(cmd.target_db.as_str(), "test_db");
    assert_eq!(
        cmd.body,
        doc! {
            "update": "test_coll",
            "bypassDocumentValidation": true,
            "writeConcern": { "w": "majority" },
            "updates": [
                {
                    "q": { "x": { "$gt": 1 } },
                    "u": { "$inc": { "x": 1 } },
                    "upsert": false,
                    "arrayFilters": [{ "y": 1 }],
                    "hint": "x_1",
                }
            ],
            "ordered": true,
        }
    );
}

#[test]
fn build_many() {
    let mut op = update(true, None);
    let cmd = op.build(&StreamDescription::new_testing()).unwrap();

    assert_eq!(
        cmd.body,
        doc! {
            "update": "test_coll",
            "updates": [
                {
                    "q": { "x": { "$gt": 1 } },
                    "u": { "$inc": { "x": 1 } },
                    "multi": true,
                }
            ],
            "ordered": true,
        }
    );
}

#[test]
fn build_pipeline_and_replacement() {
    let pipeline = vec![doc! { "$set": { "total": { "$add": ["$a", "$b"] } } }];
    let mut op = Update::new(
        Namespace::new("db", "coll"),
        Document::new(),
        UpdateOrReplace::UpdateModifications(UpdateModifications::Pipeline(pipeline.clone())),
        false,
        None,
    )
    .unwrap();
    let cmd = op.build(&StreamDescription::new_testing()).unwrap();
    let updates = cmd.body.get_array("updates").unwrap();
    assert_eq!(
        updates[0].as_document().unwrap().get("u"),
        Some(&Bson::Array(pipeline.into_iter().map(Bson::Document).collect()))
    );

    let mut op = Update::new(
        Namespace::new("db", "coll"),
        Document::new(),
        UpdateOrReplace::Replacement(doc! { "name": "new" }),
        false,
        None,
    )
    .unwrap();
    let cmd = op.build(&StreamDescription::new_testing()).unwrap();
    let updates = cmd.body.get_array("updates").unwrap();
    assert_eq!(
        updates[0].as_document().unwrap().get_document("u"),
        Ok(&doc! { "name": "new" })
    );
}

#[test]
fn invalid_modifications() {
    let not_operators = Update::new(
        Namespace::new("db", "coll"),
        Document::new(),
        UpdateOrReplace::UpdateModifications(doc! { "x": 1 }.into()),
        false,
        None,
    )
    .unwrap_err();
    assert!(matches!(*not_operators.kind, ErrorKind::InvalidArgument { .. }));

    let operators_in_replacement = Update::new(
        Namespace::new("db", "coll"),
        Document::new(),
        UpdateOrReplace::Replacement(doc! { "$set": { "x": 1 } }),
        false,
        None,
    )
    .unwrap_err();
    assert!(matches!(
        *operators_in_replacement.kind,
        ErrorKind::InvalidArgument { .. }
    ));
}

#[test]
fn retryability() {
    assert_eq!(update(false, None).retryability(), Retryability::Write);
    assert_eq!(update(true, None).retryability(), Retryability::None);
}

#[test]
fn handle_success() {
    let op = update(false, None);
    let result = handle_response_test(&op, doc! { "ok": 1, "n": 3, "nModified": 1 }).unwrap();
    assert!(result.acknowledged);
    assert_eq!(result.counts.matched, 3);
    assert_eq!(result.counts.modified, 1);
    assert!(result.upserted_id().is_none());
}

#[test]
fn handle_upsert() {
    let op = update(false, Some(UpdateOptions::builder().upsert(true).build()));
    let result = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 1,
            "nModified": 0,
            "upserted": [{ "index": 0, "_id": 1 }],
        },
    )
    .unwrap();

    assert_eq!(result.counts.matched, 0);
    assert_eq!(result.counts.modified, 0);
    assert_eq!(result.upserted_id(), Some(&Bson::Int32(1)));
}

#[test]
fn handle_write_error() {
    let op = update(false, None);
    let error = handle_response_test(
        &op,
        doc! {
            "ok": 1,
            "n": 0,
            "nModified": 0,
            "writeErrors": [{ "index": 0, "code": 1234, "errmsg": "my error string" }],
        },
    )
    .unwrap_err();

    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected a write failure, got {error:?}");
    };
    assert_eq!(failure.write_errors.len(), 1);
    assert_eq!(failure.write_errors[0].code, 1234);
    assert_eq!(failure.write_errors[0].message, "my error string");
}
