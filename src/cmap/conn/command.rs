use bson::{Document, Timestamp};
use serde::{de::DeserializeOwned, Serialize};
use serde_with::skip_serializing_none;

use super::wire::DocumentSequence;
use crate::{
    bson_util,
    client::{options::ServerAddress, session::ClusterTime},
    concern::ReadConcernInternal,
    error::{CommandError, Error, ErrorKind, Result},
    selection_criteria::ReadPreference,
};

/// A database command: the body built by an operation, plus the metadata the executor attaches
/// before framing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub(crate) name: String,
    pub(crate) target_db: String,
    /// The command document. Its first key is the command name.
    pub(crate) body: Document,
    pub(crate) document_sequences: Vec<DocumentSequence>,
    pub(crate) lsid: Option<Document>,
    pub(crate) cluster_time: Option<ClusterTime>,
    pub(crate) txn_number: Option<i64>,
    pub(crate) read_preference: Option<ReadPreference>,
    pub(crate) read_concern: Option<ReadConcernInternal>,
}

#[skip_serializing_none]
#[derive(Serialize)]
struct GenericCommandFields<'a> {
    #[serde(rename = "$db")]
    db: &'a str,

    lsid: Option<&'a Document>,

    #[serde(rename = "$clusterTime")]
    cluster_time: Option<&'a ClusterTime>,

    #[serde(rename = "txnNumber")]
    txn_number: Option<i64>,

    #[serde(rename = "$readPreference")]
    read_preference: Option<&'a ReadPreference>,

    #[serde(rename = "readConcern")]
    read_concern: Option<&'a ReadConcernInternal>,
}

impl Command {
    pub(crate) fn new(
        name: impl Into<String>,
        target_db: impl Into<String>,
        body: Document,
    ) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
            document_sequences: Vec::new(),
            lsid: None,
            cluster_time: None,
            txn_number: None,
            read_preference: None,
            read_concern: None,
        }
    }

    /// Sends `documents` as an OP_MSG document sequence named `identifier`.
    pub(crate) fn add_document_sequence(
        &mut self,
        identifier: impl Into<String>,
        documents: Vec<Document>,
    ) {
        self.document_sequences.push(DocumentSequence {
            identifier: identifier.into(),
            documents,
        });
    }

    pub(crate) fn set_session(&mut self, lsid: Document) {
        self.lsid = Some(lsid);
    }

    pub(crate) fn set_cluster_time(&mut self, cluster_time: &ClusterTime) {
        self.cluster_time = Some(cluster_time.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.txn_number = Some(txn_number);
    }

    pub(crate) fn set_read_preference(&mut self, read_preference: ReadPreference) {
        self.read_preference = Some(read_preference);
    }

    pub(crate) fn set_after_cluster_time(&mut self, operation_time: Timestamp) {
        self.read_concern = Some(ReadConcernInternal::after(operation_time));
    }

    /// The payload type 0 document of the generic command shape.
    pub(crate) fn generic_payload(&self) -> Result<Document> {
        let mut payload = self.body.clone();
        let fields = bson::to_document(&GenericCommandFields {
            db: &self.target_db,
            lsid: self.lsid.as_ref(),
            cluster_time: self.cluster_time.as_ref(),
            txn_number: self.txn_number,
            read_preference: self.read_preference.as_ref(),
            read_concern: self.read_concern.as_ref(),
        })?;
        payload.extend(fields);
        Ok(payload)
    }

    /// The query document of the legacy shape: the body with sequences inlined. Session metadata
    /// is never sent in this shape.
    pub(crate) fn legacy_query(&self) -> Result<Document> {
        let mut query = self.body.clone();
        for sequence in &self.document_sequences {
            query.insert(
                sequence.identifier.clone(),
                bson_util::to_bson_array(&sequence.documents),
            );
        }
        match self.read_preference {
            Some(ref read_preference) => Ok(bson::doc! {
                "$query": query,
                "$readPreference": bson::to_bson(read_preference)?,
            }),
            None => Ok(query),
        }
    }

    /// The command with document sequences inlined, as logged.
    pub(crate) fn to_document(&self) -> Document {
        let mut document = self.body.clone();
        for sequence in &self.document_sequences {
            document.insert(
                sequence.identifier.clone(),
                bson_util::to_bson_array(&sequence.documents),
            );
        }
        document
    }
}

/// A reply document and the server it came from.
#[derive(Debug, Clone)]
pub(crate) struct RawCommandResponse {
    pub(crate) source: ServerAddress,
    pub(crate) raw: Document,
}

impl RawCommandResponse {
    pub(crate) fn new(source: ServerAddress, raw: Document) -> Self {
        Self { source, raw }
    }

    #[cfg(test)]
    pub(crate) fn with_document(raw: Document) -> Self {
        Self::new(ServerAddress::new("localhost", None), raw)
    }

    /// Deserializes the reply body. Decoding failures are protocol errors.
    pub(crate) fn body<T: DeserializeOwned>(&self) -> Result<T> {
        bson::from_document(self.raw.clone()).map_err(|e| {
            Error::invalid_response(format!(
                "failed to deserialize {} reply from {}: {e}",
                std::any::type_name::<T>(),
                self.source
            ))
        })
    }

    /// Whether the `ok` field is truthy. A missing `ok` counts as failure.
    pub(crate) fn is_success(&self) -> bool {
        self.raw.get("ok").is_some_and(bson_util::is_truthy)
    }

    pub(crate) fn cluster_time(&self) -> Option<ClusterTime> {
        self.raw
            .get_document("$clusterTime")
            .ok()
            .and_then(|cluster_time| bson::from_document(cluster_time.clone()).ok())
    }

    pub(crate) fn operation_time(&self) -> Option<Timestamp> {
        self.raw.get_timestamp("operationTime").ok()
    }

    pub(crate) fn error_labels(&self) -> Vec<String> {
        self.raw
            .get_array("errorLabels")
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|label| label.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The error for an `ok: 0` reply, carrying the server's code, message and labels.
    pub(crate) fn command_error(&self) -> Error {
        let labels = self.error_labels();
        let command_error = match self.body::<CommandError>() {
            Ok(error) => error,
            Err(e) => return e,
        };
        Error::new(ErrorKind::Command(command_error), Some(labels))
    }

    pub(crate) fn into_document(self) -> Document {
        self.raw
    }
}
