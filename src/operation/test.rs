use pretty_assertions::assert_eq;
use serde::Serialize;

use crate::{
    bson::{doc, Document},
    cmap::{RawCommandResponse, StreamDescription},
    error::{ErrorKind, Result},
    operation::{
        append_options,
        EndSessions,
        KillCursors,
        Operation,
        WriteConcernOnlyBody,
        WriteResponseBody,
    },
    options::{ReadPreference, SelectionCriteria, ServerAddress},
    results::{WriteCounts, WriteResult},
    Namespace,
};

pub(crate) fn handle_response_test<T: Operation>(op: &T, response_doc: Document) -> Result<T::O> {
    let raw = RawCommandResponse::with_document(response_doc);
    op.handle_response(raw, &StreamDescription::new_testing())
}

pub(crate) fn op_selection_criteria<F, T>(constructor: F)
where
    T: Operation,
    F: Fn(Option<SelectionCriteria>) -> T,
{
    let op = constructor(None);
    assert_eq!(op.selection_criteria(), None);

    let read_pref: SelectionCriteria = ReadPreference::Secondary {
        options: Default::default(),
    }
    .into();

    let op = constructor(Some(read_pref.clone()));
    assert_eq!(op.selection_criteria(), Some(&read_pref));
}

#[test]
fn append_options_extends_the_body() {
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Options {
        batch_size: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    }

    let mut body = doc! { "find": "coll" };
    append_options(
        &mut body,
        Some(&Options {
            batch_size: 3,
            comment: None,
        }),
    )
    .unwrap();
    assert_eq!(body, doc! { "find": "coll", "batchSize": 3 });

    append_options::<Options>(&mut body, None).unwrap();
    assert_eq!(body, doc! { "find": "coll", "batchSize": 3 });
}

#[test]
fn write_response_validation() {
    let result = || WriteResult::acknowledged(Document::new(), WriteCounts::default());

    let clean: WriteResponseBody = crate::bson::from_document(doc! { "ok": 1, "n": 2 }).unwrap();
    assert_eq!(clean.n, 2);
    assert!(clean.validate(result()).is_ok());

    let failed: WriteResponseBody = crate::bson::from_document(doc! {
        "ok": 1,
        "n": 0,
        "writeErrors": [{ "index": 0, "code": 121, "errmsg": "document failed validation" }],
        "errorLabels": ["Custom"],
    })
    .unwrap();
    let error = failed.validate(result()).unwrap_err();
    assert!(error.contains_label("Custom"));
    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected a write failure, got {error:?}");
    };
    assert_eq!(failure.write_errors[0].code, 121);
    assert_eq!(failure.write_errors[0].message, "document failed validation");
    assert!(failure.write_concern_error.is_none());
    assert!(failure.partial_result.is_some());
}

#[test]
fn write_concern_only_validation() {
    let body: WriteConcernOnlyBody = crate::bson::from_document(doc! { "ok": 1 }).unwrap();
    assert!(body.validate().is_ok());

    let body: WriteConcernOnlyBody = crate::bson::from_document(doc! {
        "ok": 1,
        "writeConcernError": {
            "code": 100,
            "codeName": "UnsatisfiableWriteConcern",
            "errmsg": "no",
        },
    })
    .unwrap();
    let error = body.validate().unwrap_err();
    assert_eq!(error.code(), Some(100));
    assert!(error.partial_result().is_none());
}

#[test]
fn kill_cursors() {
    let mut op = KillCursors::new(
        Namespace::new("test_db", "test_coll"),
        vec![12, 34],
        ServerAddress::new("localhost", 27017),
    );
    let cmd = op.build(&StreamDescription::new_testing()).unwrap();
    assert_eq!(cmd.target_db, "test_db");
    assert_eq!(
        cmd.body,
        doc! { "killCursors": "test_coll", "cursors": [12_i64, 34_i64] }
    );
    assert!(matches!(
        op.selection_criteria(),
        Some(SelectionCriteria::Predicate(_))
    ));
}

#[test]
fn end_sessions() {
    let ids = vec![doc! { "id": 1 }, doc! { "id": 2 }];
    let mut op = EndSessions::new(ids.clone());
    let cmd = op.build(&StreamDescription::new_testing()).unwrap();

    assert_eq!(cmd.target_db, "admin");
    assert_eq!(cmd.body, doc! { "endSessions": ids });
    assert!(!op.supports_sessions());
    assert_eq!(
        op.selection_criteria(),
        Some(&SelectionCriteria::ReadPreference(
            ReadPreference::PrimaryPreferred {
                options: Default::default()
            }
        ))
    );
}
