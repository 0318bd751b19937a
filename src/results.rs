//! Contains the types of results returned by CRUD operations.

use std::collections::HashMap;

use serde::Serialize;

use crate::bson::{Bson, Document};

/// Per-kind counts reported by the server for a write.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WriteCounts {
    /// The raw `n` of the reply.
    pub n: u64,

    /// The number of documents inserted.
    pub inserted: u64,

    /// The number of documents that matched the filter of an update or replace.
    pub matched: u64,

    /// The number of documents that were modified by an update or replace.
    pub modified: u64,

    /// The number of documents deleted.
    pub deleted: u64,

    /// The `_id`s of upserted documents, keyed by the index of the statement that upserted them.
    pub upserted_ids: HashMap<usize, Bson>,
}

/// The result of an insert, update, replace or delete.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WriteResult {
    /// Whether the server acknowledged the write. Unacknowledged writes report no counts.
    pub acknowledged: bool,

    /// The reply document, for acknowledged writes.
    #[serde(skip)]
    pub raw_reply: Option<Document>,

    /// The counts reported by the server.
    pub counts: WriteCounts,

    /// The `_id`s of inserted documents, keyed by the index of the document in the request.
    pub inserted_ids: HashMap<usize, Bson>,
}

impl WriteResult {
    pub(crate) fn acknowledged(raw_reply: Document, counts: WriteCounts) -> Self {
        Self {
            acknowledged: true,
            raw_reply: Some(raw_reply),
            counts,
            inserted_ids: HashMap::new(),
        }
    }

    pub(crate) fn unacknowledged(inserted_ids: HashMap<usize, Bson>) -> Self {
        Self {
            acknowledged: false,
            raw_reply: None,
            counts: WriteCounts::default(),
            inserted_ids,
        }
    }

    /// The `_id` of the first inserted document, for single-document inserts.
    pub fn inserted_id(&self) -> Option<&Bson> {
        self.inserted_ids.get(&0)
    }

    /// The `_id` of the upserted document, for single-statement updates.
    pub fn upserted_id(&self) -> Option<&Bson> {
        self.counts.upserted_ids.get(&0)
    }
}
