use pretty_assertions::assert_eq;

use super::{
    parse_reply,
    read_frame,
    read_reply,
    FramingOptions,
    Header,
    Message,
    MessageFlags,
    OpCode,
    Query,
    QueryFlags,
    Reply,
    ResponseFlags,
    WireMessage,
    WireShape,
};
use crate::{
    bson::{doc, Document},
    cmap::Command,
    selection_criteria::ReadPreference,
};

fn insert_command() -> Command {
    let mut command = Command::new("insert", "test", doc! { "insert": "coll", "ordered": true });
    command.add_document_sequence("documents", vec![doc! { "_id": 1 }, doc! { "_id": 2 }]);
    command
}

fn reply_message(response_to: i32, flags: MessageFlags, document: Document) -> Vec<u8> {
    Message {
        document_payload: document,
        document_sequences: Vec::new(),
        response_to,
        flags,
        request_id: 99,
    }
    .to_bytes()
    .unwrap()
}

fn decode_frame(bytes: &[u8]) -> (Header, &[u8]) {
    let mut reader = bytes;
    let header = Header::read_from(&mut reader).unwrap();
    assert_eq!(header.length as usize, bytes.len());
    (header, reader)
}

#[test]
fn shape_threshold() {
    assert_eq!(WireShape::for_max_wire_version(None), WireShape::Legacy);
    assert_eq!(WireShape::for_max_wire_version(Some(0)), WireShape::Legacy);
    assert_eq!(WireShape::for_max_wire_version(Some(5)), WireShape::Legacy);
    assert_eq!(
        WireShape::for_max_wire_version(Some(6)),
        WireShape::GenericCommand
    );
    assert_eq!(
        WireShape::for_max_wire_version(Some(21)),
        WireShape::GenericCommand
    );
}

#[test]
fn generic_message() {
    let mut command = insert_command();
    command.set_session(doc! { "id": 1 });
    command.set_txn_number(3);

    let message = WireMessage::build(&command, WireShape::GenericCommand, Default::default())
        .unwrap();
    assert_eq!(message.shape(), WireShape::GenericCommand);
    assert!(message.expects_reply());

    let bytes = message.to_bytes().unwrap();
    let (header, body) = decode_frame(&bytes);
    assert_eq!(header.op_code, OpCode::Message);
    assert_eq!(header.request_id, message.request_id());
    assert_eq!(header.response_to, 0);

    let decoded = Message::read_body(&header, body).unwrap();
    assert_eq!(decoded.flags, MessageFlags::empty());
    assert_eq!(
        decoded.document_payload,
        doc! {
            "insert": "coll",
            "ordered": true,
            "$db": "test",
            "lsid": { "id": 1 },
            "txnNumber": 3_i64,
        }
    );
    assert_eq!(decoded.document_sequences.len(), 1);
    assert_eq!(decoded.document_sequences[0].identifier, "documents");
    assert_eq!(
        decoded.document_sequences[0].documents,
        vec![doc! { "_id": 1 }, doc! { "_id": 2 }]
    );
}

#[test]
fn generic_message_without_reply() {
    let message = WireMessage::build(
        &insert_command(),
        WireShape::GenericCommand,
        FramingOptions {
            secondary_ok: false,
            more_to_come: true,
        },
    )
    .unwrap();
    assert!(!message.expects_reply());

    let bytes = message.to_bytes().unwrap();
    let (header, body) = decode_frame(&bytes);
    let decoded = Message::read_body(&header, body).unwrap();
    assert!(decoded.flags.contains(MessageFlags::MORE_TO_COME));
}

#[test]
fn legacy_query() {
    let mut command = insert_command();
    command.set_session(doc! { "id": 1 });

    let message = WireMessage::build(
        &command,
        WireShape::Legacy,
        FramingOptions {
            secondary_ok: true,
            more_to_come: true,
        },
    )
    .unwrap();
    assert_eq!(message.shape(), WireShape::Legacy);
    // OP_QUERY is always answered.
    assert!(message.expects_reply());

    let bytes = message.to_bytes().unwrap();
    let (header, body) = decode_frame(&bytes);
    assert_eq!(header.op_code, OpCode::Query);

    let query = Query::read_body(&header, body).unwrap();
    assert_eq!(query.full_collection_name, "test.$cmd");
    assert_eq!(query.num_to_skip, 0);
    assert_eq!(query.num_to_return, -1);
    assert_eq!(query.flags, QueryFlags::SECONDARY_OK);
    assert!(query.return_field_selector.is_none());
    assert_eq!(
        query.query,
        doc! {
            "insert": "coll",
            "ordered": true,
            "documents": [{ "_id": 1 }, { "_id": 2 }],
        }
    );
}

#[test]
fn legacy_query_with_read_preference() {
    let mut command = Command::new("find", "test", doc! { "find": "coll" });
    command.set_read_preference(ReadPreference::Nearest {
        options: Default::default(),
    });

    let message = WireMessage::build(&command, WireShape::Legacy, Default::default()).unwrap();
    let WireMessage::Legacy(ref query) = message else {
        panic!("expected a legacy message, got {message:?}");
    };
    assert_eq!(query.flags, QueryFlags::empty());
    assert_eq!(query.query.get_document("$query"), Ok(&doc! { "find": "coll" }));
    assert_eq!(
        query
            .query
            .get_document("$readPreference")
            .unwrap()
            .get_str("mode"),
        Ok("nearest")
    );
}

#[test]
fn request_ids_are_unique() {
    let command = insert_command();
    let first =
        WireMessage::build(&command, WireShape::GenericCommand, Default::default()).unwrap();
    let second = WireMessage::build(&command, WireShape::Legacy, Default::default()).unwrap();
    assert_ne!(first.request_id(), second.request_id());
}

#[test]
fn parse_generic_reply() {
    let bytes = reply_message(7, MessageFlags::empty(), doc! { "ok": 1, "n": 2 });
    let reply = parse_reply(&bytes).unwrap();
    assert_eq!(reply.response_to, 7);
    assert_eq!(reply.document, doc! { "ok": 1, "n": 2 });
}

#[test]
fn parse_generic_reply_with_sequence() {
    let bytes = Message {
        document_payload: doc! { "ok": 1 },
        document_sequences: vec![super::DocumentSequence {
            identifier: "docs".to_string(),
            documents: vec![doc! { "a": 1 }],
        }],
        response_to: 1,
        flags: MessageFlags::empty(),
        request_id: 2,
    }
    .to_bytes()
    .unwrap();

    let reply = parse_reply(&bytes).unwrap();
    assert_eq!(reply.document, doc! { "ok": 1, "docs": [{ "a": 1 }] });
}

#[test]
fn checksum_is_skipped() {
    let mut bytes = reply_message(7, MessageFlags::CHECKSUM_PRESENT, doc! { "ok": 1 });
    bytes.extend_from_slice(&0xdead_beef_u32.to_le_bytes());
    let length = bytes.len() as i32;
    bytes[..4].copy_from_slice(&length.to_le_bytes());

    let reply = parse_reply(&bytes).unwrap();
    assert_eq!(reply.document, doc! { "ok": 1 });
}

#[test]
fn parse_legacy_reply() {
    let bytes = Reply {
        response_to: 11,
        response_flags: ResponseFlags::AWAIT_CAPABLE,
        cursor_id: 0,
        starting_from: 0,
        num_returned: 1,
        docs: vec![doc! { "ok": 1, "value": "x" }],
    }
    .to_bytes(5)
    .unwrap();

    let reply = parse_reply(&bytes).unwrap();
    assert_eq!(reply.response_to, 11);
    assert_eq!(reply.document, doc! { "ok": 1, "value": "x" });
}

#[test]
fn legacy_query_failure() {
    let bytes = Reply {
        response_to: 11,
        response_flags: ResponseFlags::QUERY_FAILURE,
        cursor_id: 0,
        starting_from: 0,
        num_returned: 1,
        docs: vec![doc! { "$err": "not authorized", "code": 13 }],
    }
    .to_bytes(5)
    .unwrap();

    let reply = parse_reply(&bytes).unwrap();
    assert_eq!(
        reply.document,
        doc! { "ok": 0, "errmsg": "not authorized", "code": 13 }
    );
}

#[test]
fn legacy_reply_document_count() {
    let reply = |num_returned, docs| Reply {
        response_to: 1,
        response_flags: ResponseFlags::empty(),
        cursor_id: 0,
        starting_from: 0,
        num_returned,
        docs,
    };

    let empty = reply(0, Vec::new()).to_bytes(5).unwrap();
    assert!(parse_reply(&empty).unwrap_err().is_invalid_response());

    let two = reply(2, vec![doc! { "ok": 1 }, doc! { "ok": 1 }])
        .to_bytes(5)
        .unwrap();
    assert!(parse_reply(&two).unwrap_err().is_invalid_response());

    let mismatched = reply(3, vec![doc! { "ok": 1 }]).to_bytes(5).unwrap();
    assert!(parse_reply(&mismatched).unwrap_err().is_invalid_response());
}

#[test]
fn malformed_frames() {
    let bytes = reply_message(7, MessageFlags::empty(), doc! { "ok": 1 });

    // truncated
    let error = parse_reply(&bytes[..bytes.len() - 3]).unwrap_err();
    assert!(error.is_invalid_response());

    // header too short
    let error = parse_reply(&bytes[..10]).unwrap_err();
    assert!(error.is_invalid_response());

    // unknown op code
    let mut unknown = bytes.clone();
    unknown[12..16].copy_from_slice(&2010_i32.to_le_bytes());
    assert!(parse_reply(&unknown).unwrap_err().is_invalid_response());

    // a request is not a reply
    let query = WireMessage::build(&insert_command(), WireShape::Legacy, Default::default())
        .unwrap()
        .to_bytes()
        .unwrap();
    assert!(parse_reply(&query).unwrap_err().is_invalid_response());
}

#[test]
fn malformed_sections() {
    let header = |body: &[u8]| Header {
        length: (Header::LENGTH + body.len()) as i32,
        request_id: 1,
        response_to: 0,
        op_code: OpCode::Message,
    };
    let mut payload = Vec::new();
    doc! { "ok": 1 }.to_writer(&mut payload).unwrap();

    let mut duplicate = 0_u32.to_le_bytes().to_vec();
    for _ in 0..2 {
        duplicate.push(0);
        duplicate.extend_from_slice(&payload);
    }
    let error = Message::read_body(&header(&duplicate[..]), &duplicate).unwrap_err();
    assert!(error.is_invalid_response());

    let missing = 0_u32.to_le_bytes().to_vec();
    let error = Message::read_body(&header(&missing[..]), &missing).unwrap_err();
    assert!(error.is_invalid_response());

    let mut bad_kind = 0_u32.to_le_bytes().to_vec();
    bad_kind.push(4);
    bad_kind.extend_from_slice(&payload);
    let error = Message::read_body(&header(&bad_kind[..]), &bad_kind).unwrap_err();
    assert!(error.is_invalid_response());
}

#[tokio::test]
async fn frame_length_bounds() {
    let bytes = reply_message(7, MessageFlags::empty(), doc! { "ok": 1 });

    let frame = read_frame(&mut bytes.as_slice(), 1024).await.unwrap();
    assert_eq!(frame, bytes);

    let error = read_frame(&mut bytes.as_slice(), 8).await.unwrap_err();
    assert!(error.is_invalid_response());

    let short = 4_i32.to_le_bytes();
    let error = read_frame(&mut short.as_slice(), 1024).await.unwrap_err();
    assert!(error.is_invalid_response());

    // the stream closing mid-frame is a network failure.
    let error = read_frame(&mut &bytes[..20], 1024).await.unwrap_err();
    assert!(error.is_network_error());
}

#[tokio::test]
async fn reply_must_answer_the_request() {
    let bytes = reply_message(7, MessageFlags::empty(), doc! { "ok": 1 });

    let document = read_reply(&mut bytes.as_slice(), 7, 1024).await.unwrap();
    assert_eq!(document, doc! { "ok": 1 });

    let error = read_reply(&mut bytes.as_slice(), 8, 1024).await.unwrap_err();
    assert!(error.is_invalid_response());
}
