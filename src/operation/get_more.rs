
use std::{collections::VecDeque, time::Duration};

use crate::{
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorInformation,
    error::Result,
    operation::{CursorBody, Operation},
    options::SelectionCriteria,
    Namespace,
};

/// Fetches the next batch of an open cursor from the server that created it.
#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    selection_criteria: SelectionCriteria,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    comment: Option<Bson>,
}

impl GetMore {
    pub(crate) fn new(info: &CursorInformation) -> Self {
        Self {
            ns: info.ns.clone(),
            cursor_id: info.id,
            selection_criteria: SelectionCriteria::from_address(info.address.clone()),
            batch_size: info.batch_size,
            max_time: info.max_time,
            comment: info.comment.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: VecDeque<Document>,
    pub(crate) exhausted: bool,
    pub(crate) id: i64,
}

impl Operation for GetMore {
    type O = GetMoreResult;

    const NAME: &'static str = "getMore";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size.filter(|size| *size != 0) {
            body.insert("batchSize", i32::try_from(batch_size).unwrap_or(i32::MAX));
        }

        if let Some(ref max_time) = self.max_time {
            body.insert(
                "maxTimeMS",
                i32::try_from(max_time.as_millis()).unwrap_or(i32::MAX),
            );
        }

        if let Some(ref comment) = self.comment {
            body.insert("comment", comment.clone());
        }

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;

        Ok(GetMoreResult {
            batch: response.cursor.first_batch,
            exhausted: response.cursor.id == 0,
            id: response.cursor.id,
        })
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
    }
}
