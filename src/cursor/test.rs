use std::time::Duration;

use futures::TryStreamExt;
use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Document},
    options::CursorType,
    test::util::{replica_set_primary, MockServer, ReceivedCommand, TestClient},
};

fn cursor_reply(id: i64, batch_key: &str, docs: Vec<Document>) -> Document {
    let mut cursor = doc! { "id": id, "ns": "test.coll" };
    cursor.insert(batch_key, docs);
    doc! { "ok": 1, "cursor": cursor }
}

async fn wait_for(server: &MockServer, name: &str) -> Vec<ReceivedCommand> {
    for _ in 0..100 {
        let received = server.received_named(name);
        if !received.is_empty() {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no {name} command received");
}

#[tokio::test]
async fn iterates_across_batches() {
    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Document>("coll");

    server.reply_next(
        "find",
        cursor_reply(42, "firstBatch", vec![doc! { "_id": 1 }, doc! { "_id": 2 }]),
    );
    server.reply_next("getMore", cursor_reply(42, "nextBatch", vec![doc! { "_id": 3 }]));
    server.reply_next("getMore", cursor_reply(0, "nextBatch", vec![doc! { "_id": 4 }]));

    let mut cursor = coll.find(doc! {}).batch_size(2).await.unwrap();
    assert_eq!(cursor.id(), 42);
    assert_eq!(cursor.batch_len(), 2);
    assert!(!cursor.is_exhausted());

    let mut ids = Vec::new();
    while cursor.advance().await.unwrap() {
        ids.push(cursor.current().unwrap().get_i32("_id").unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.id(), 0);
    drop(cursor);

    let find = &server.received_named("find")[0];
    let get_mores = server.received_named("getMore");
    assert_eq!(get_mores.len(), 2);
    for get_more in &get_mores {
        assert_eq!(get_more.document.get_i64("getMore"), Ok(42));
        assert_eq!(get_more.document.get_str("collection"), Ok("coll"));
        assert_eq!(get_more.document.get_i32("batchSize"), Ok(2));
        assert_eq!(
            get_more.document.get_document("lsid"),
            find.document.get_document("lsid")
        );
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.received_named("killCursors").is_empty());
}

#[tokio::test]
async fn dropped_cursor_is_killed() {
    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Document>("coll");

    server.reply_next(
        "find",
        cursor_reply(42, "firstBatch", vec![doc! { "_id": 1 }, doc! { "_id": 2 }]),
    );

    let mut cursor = coll.find(doc! {}).await.unwrap();
    assert!(cursor.advance().await.unwrap());
    drop(cursor);

    let kill = &wait_for(&server, "killCursors").await[0];
    assert_eq!(kill.db, "test");
    assert_eq!(kill.document.get_str("killCursors"), Ok("coll"));
    assert_eq!(
        kill.document.get_array("cursors"),
        Ok(&vec![crate::bson::Bson::Int64(42)])
    );

    let find = &server.received_named("find")[0];
    assert_eq!(
        kill.document.get_document("lsid"),
        find.document.get_document("lsid")
    );
}

#[tokio::test]
async fn tailable_cursor_waits_for_new_results() {
    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Document>("capped");

    server.reply_next("find", cursor_reply(7, "firstBatch", vec![doc! { "_id": 1 }]));
    server.reply_next("getMore", cursor_reply(7, "nextBatch", Vec::new()));
    server.reply_next("getMore", cursor_reply(7, "nextBatch", vec![doc! { "_id": 2 }]));

    let mut cursor = coll
        .find(doc! {})
        .cursor_type(CursorType::TailableAwait)
        .max_await_time(Duration::from_millis(100))
        .await
        .unwrap();

    assert!(cursor.advance().await.unwrap());
    assert_eq!(cursor.current(), Some(&doc! { "_id": 1 }));

    // nothing new yet: the cursor stays open.
    assert!(!cursor.advance().await.unwrap());
    assert!(cursor.current().is_none());
    assert!(!cursor.is_exhausted());

    assert!(cursor.advance().await.unwrap());
    assert_eq!(cursor.current(), Some(&doc! { "_id": 2 }));

    let find = &server.received_named("find")[0];
    assert_eq!(find.document.get_bool("tailable"), Ok(true));
    assert_eq!(find.document.get_bool("awaitData"), Ok(true));
    for get_more in server.received_named("getMore") {
        assert_eq!(get_more.document.get_i32("maxTimeMS"), Ok(100));
    }

    drop(cursor);
    let kill = &wait_for(&server, "killCursors").await[0];
    assert_eq!(kill.document.get_array("cursors").unwrap().len(), 1);
}

#[tokio::test]
async fn stream_of_typed_results() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Item {
        #[serde(rename = "_id")]
        id: i32,
    }

    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Item>("coll");

    server.reply_next(
        "find",
        cursor_reply(9, "firstBatch", vec![doc! { "_id": 1 }, doc! { "_id": 2 }]),
    );
    server.reply_next("getMore", cursor_reply(0, "nextBatch", vec![doc! { "_id": 3 }]));

    let items: Vec<Item> = coll
        .find(doc! {})
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }]);
}

#[tokio::test]
async fn current_requires_advance() {
    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Document>("coll");

    server.reply_next("find", cursor_reply(0, "firstBatch", vec![doc! { "_id": 1 }]));

    let mut cursor = coll.find(doc! {}).await.unwrap();
    assert!(cursor.is_exhausted());
    assert!(cursor.deserialize_current().is_err());

    assert_eq!(cursor.try_next().await.unwrap(), Some(doc! { "_id": 1 }));
    assert_eq!(cursor.try_next().await.unwrap(), None);
    assert!(server.received_named("getMore").is_empty());
}

#[tokio::test]
async fn get_more_failure_is_reported() {
    let TestClient { client, server, .. } = TestClient::new(replica_set_primary());
    let coll = client.database("test").collection::<Document>("coll");

    server.reply_next("find", cursor_reply(5, "firstBatch", Vec::new()));
    server.reply_next(
        "getMore",
        doc! {
            "ok": 0,
            "code": 43,
            "codeName": "CursorNotFound",
            "errmsg": "cursor id 5 not found",
        },
    );

    let mut cursor = coll.find(doc! {}).await.unwrap();
    let error = cursor.advance().await.unwrap_err();
    assert_eq!(error.code(), Some(43));
    // getMore is never retried.
    assert_eq!(server.received_named("getMore").len(), 1);
}
