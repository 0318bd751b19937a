mod delete;
mod drop_indexes;
mod end_sessions;
mod find;
mod find_and_modify;
mod get_more;
mod insert;
mod kill_cursors;
mod update;

#[cfg(test)]
mod test;

use std::{collections::VecDeque, fmt::Debug, ops::Deref, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    bson::{self, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{BulkWriteFailure, Error, ErrorKind, IndexedWriteError, Result, WriteConcernError},
    options::WriteConcern,
    results::WriteResult,
    selection_criteria::SelectionCriteria,
    Namespace,
};

pub(crate) use delete::Delete;
pub(crate) use drop_indexes::DropIndexes;
pub(crate) use end_sessions::EndSessions;
pub(crate) use find::Find;
pub(crate) use find_and_modify::{FindAndModify, FindAndModifyOptions, Modification};
pub(crate) use get_more::{GetMore, GetMoreResult};
pub(crate) use insert::Insert;
pub(crate) use kill_cursors::KillCursors;
pub(crate) use update::{Update, UpdateOrReplace};

const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// A trait modeling the behavior of a server side operation. The executor drives every operation
/// through the same steps: select a server, check out a connection, `build`, attach session and
/// cluster time metadata, send, and hand the reply to `handle_response`.
pub(crate) trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    /// The operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &StreamDescription) -> Result<Command>;

    /// Interprets a successful (`ok: 1`) server response to the command.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// The output of a write sent with an unacknowledged write concern, for which the server sends
    /// nothing back.
    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Err(Error::internal(format!(
            "{} cannot be sent unacknowledged",
            Self::NAME
        )))
    }

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// Criteria to use for selecting the server that this operation will be executed on.
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        None
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// Whether a causally consistent session may attach `readConcern.afterClusterTime`.
    fn supports_read_concern(&self) -> bool {
        false
    }

    /// Whether this operation supports sessions or not.
    fn supports_sessions(&self) -> bool {
        true
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// A per-operation bound on the whole execution, overriding the client's.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    fn name(&self) -> &str {
        Self::NAME
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    Read,
    None,
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to a
/// Document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize + Debug>(
    doc: &mut Document,
    options: Option<&T>,
) -> Result<()> {
    if let Some(options) = options {
        let options_doc = bson::to_document(options)?;
        doc.extend(options_doc);
    }
    Ok(())
}

/// A write concern that is empty is the server default and is not sent.
pub(crate) fn remove_empty_write_concern(write_concern: &mut Option<WriteConcern>) {
    if write_concern.as_ref().is_some_and(WriteConcern::is_empty) {
        *write_concern = None;
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct EmptyBody {}

/// The reply to an acknowledged insert, update or delete.
#[derive(Deserialize, Debug)]
pub(crate) struct WriteResponseBody<T = EmptyBody> {
    #[serde(flatten)]
    body: T,

    #[serde(default)]
    pub(crate) n: u64,

    #[serde(rename = "writeErrors")]
    pub(crate) write_errors: Option<Vec<IndexedWriteError>>,

    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl<T> WriteResponseBody<T> {
    /// Passes `result` through if no item and no write concern failed. Otherwise fails with the
    /// item errors and the write concern error, carrying `result` as the partial result.
    pub(crate) fn validate(self, result: WriteResult) -> Result<WriteResult> {
        if self.write_errors.is_none() && self.write_concern_error.is_none() {
            return Ok(result);
        }

        let failure = BulkWriteFailure {
            write_errors: self.write_errors.unwrap_or_default(),
            write_concern_error: self.write_concern_error,
            partial_result: Some(result),
        };

        Err(Error::new(ErrorKind::BulkWrite(failure), self.labels))
    }
}

impl<T> Deref for WriteResponseBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// Body of a write response that can carry a write concern error but not item errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::BulkWrite(BulkWriteFailure {
                    write_concern_error: Some(wc_error.clone()),
                    ..Default::default()
                }),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: Namespace,

    #[serde(default, alias = "nextBatch")]
    pub(crate) first_batch: VecDeque<Document>,
}

/// Upserted ids as reported in an update reply: `[{ index, _id }]`.
#[derive(Debug, Deserialize)]
pub(crate) struct UpsertedId {
    pub(crate) index: usize,

    #[serde(rename = "_id")]
    pub(crate) id: Bson,
}
