
use std::time::Duration;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::{CursorInformation, CursorSpecification},
    error::{Error, Result},
    operation::{append_options, CursorBody, Operation, Retryability, SERVER_4_4_0_WIRE_VERSION},
    options::{CursorType, FindOptions, SelectionCriteria},
    Namespace,
};

#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<Box<FindOptions>>,
}

impl Find {
    /// Fails on options the server would reject, before anything is sent.
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Self> {
        if let Some(ref options) = options {
            if options.limit.is_some_and(|limit| limit < 0) {
                return Err(Error::invalid_argument("limit must not be negative"));
            }
            if options.skip.is_some_and(|skip| skip < 0) {
                return Err(Error::invalid_argument("skip must not be negative"));
            }
            if options
                .batch_size
                .is_some_and(|batch_size| batch_size > i32::MAX as u32)
            {
                return Err(Error::invalid_argument(
                    "the batch size must fit into a signed 32-bit integer",
                ));
            }
        }

        Ok(Self {
            ns,
            filter,
            options: options.map(Box::new),
        })
    }

    #[cfg(test)]
    pub(crate) fn options(&self) -> Option<&FindOptions> {
        self.options.as_deref()
    }
}

impl Operation for Find {
    type O = CursorSpecification;

    const NAME: &'static str = "find";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "filter": self.filter.clone(),
        };

        if let Some(ref options) = self.options {
            match options.cursor_type {
                Some(CursorType::Tailable) => {
                    body.insert("tailable", true);
                }
                Some(CursorType::TailableAwait) => {
                    body.insert("tailable", true);
                    body.insert("awaitData", true);
                }
                _ => {}
            };
        }

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        let source = response.source.clone();
        let response: CursorBody = response.body()?;
        let options = self.options.as_deref();

        // getMore carries maxTimeMS only for await cursors, where it bounds the server's wait.
        let cursor_type = options.and_then(|opts| opts.cursor_type).unwrap_or_default();
        let max_time = match cursor_type {
            CursorType::TailableAwait => options.and_then(|opts| opts.max_await_time),
            _ => None,
        };

        // getMore accepts a comment on 4.4+ only.
        let comment = if description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION {
            None
        } else {
            options.and_then(|opts| opts.comment.clone())
        };

        Ok(CursorSpecification {
            info: CursorInformation {
                ns: response.cursor.ns,
                address: source,
                id: response.cursor.id,
                batch_size: options.and_then(|opts| opts.batch_size),
                max_time,
                comment,
                cursor_type,
            },
            initial_buffer: response.cursor.first_batch,
        })
    }

    fn supports_read_concern(&self) -> bool {
        true
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn timeout(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.timeout)
    }
}
