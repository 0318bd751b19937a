
use std::time::Duration;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{append_options, Operation, Retryability, WriteResponseBody},
    options::{DeleteOptions, Hint, WriteConcern},
    results::{WriteCounts, WriteResult},
    Namespace,
};

#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    filter: Document,
    limit: u32,
    options: Option<DeleteOptions>,
    hint: Option<Hint>,
}

impl Delete {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        limit: Option<u32>,
        mut options: Option<DeleteOptions>,
    ) -> Self {
        if let Some(options) = options.as_mut() {
            super::remove_empty_write_concern(&mut options.write_concern);
        }
        Self {
            ns,
            filter,
            limit: limit.unwrap_or(0), // 0 = no limit
            hint: options.as_mut().and_then(|opts| opts.hint.take()),
            options,
        }
    }
}

impl Operation for Delete {
    type O = WriteResult;

    const NAME: &'static str = "delete";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut delete = doc! {
            "q": self.filter.clone(),
            "limit": self.limit,
        };

        if let Some(ref hint) = self.hint {
            delete.insert("hint", crate::bson::to_bson(&hint)?);
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "deletes": [delete],
            "ordered": true,
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        raw_response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let body: WriteResponseBody = raw_response.body()?;
        let counts = WriteCounts {
            n: body.n,
            deleted: body.n,
            ..Default::default()
        };
        body.validate(WriteResult::acknowledged(raw_response.into_document(), counts))
    }

    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Ok(WriteResult::unacknowledged(Default::default()))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.limit == 1 {
            Retryability::Write
        } else {
            Retryability::None
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.timeout)
    }
}
