pub(crate) mod command;
mod stream_description;
pub(crate) mod wire;

use std::time::{Duration, Instant};

use bson::Document;
use derive_where::derive_where;

pub(crate) use self::{
    command::{Command, RawCommandResponse},
    stream_description::StreamDescription,
    wire::{FramingOptions, WireMessage, WireShape},
};
use super::establish::AsyncStream;
use crate::{
    error::{Error, Result},
    options::ServerAddress,
};

/// A single transport stream to a server, owned by exactly one pool.
#[derive_where(Debug)]
pub(crate) struct Connection {
    /// Driver-generated ID for the connection, unique within its pool.
    pub(crate) id: u32,

    pub(crate) address: ServerAddress,

    /// The pool generation this connection was created in. Connections from an older
    /// generation are closed instead of being reused.
    pub(crate) generation: u32,

    pub(crate) stream_description: Option<StreamDescription>,

    /// When the connection was last checked back into the pool.
    ready_and_available_time: Option<Instant>,

    /// Set while an exchange is in flight and left set if it failed, so a cancelled or failed
    /// exchange never hands a half-read stream back to the pool.
    broken: bool,

    #[derive_where(skip)]
    stream: AsyncStream,
}

impl Connection {
    pub(crate) fn new(
        id: u32,
        address: ServerAddress,
        generation: u32,
        stream: AsyncStream,
    ) -> Self {
        Self {
            id,
            address,
            generation,
            stream_description: None,
            ready_and_available_time: None,
            broken: false,
            stream,
        }
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn mark_as_available(&mut self) {
        self.ready_and_available_time = Some(Instant::now());
    }

    /// Whether the connection has sat unused in the pool for longer than `max_idle_time`.
    pub(crate) fn is_idle(&self, max_idle_time: Option<Duration>) -> bool {
        match (self.ready_and_available_time, max_idle_time) {
            (Some(ready), Some(max)) if !max.is_zero() => ready.elapsed() >= max,
            _ => false,
        }
    }

    pub(crate) fn stream_description(&self) -> Result<&StreamDescription> {
        self.stream_description.as_ref().ok_or_else(|| {
            Error::internal("stream description not set on a checked out connection")
        })
    }

    /// Writes `message` and, unless it carries `moreToCome`, reads the matching reply. The whole
    /// exchange is bounded by `deadline`.
    pub(crate) async fn send_message(
        &mut self,
        message: WireMessage,
        deadline: Option<Instant>,
    ) -> Result<Option<Document>> {
        if self.broken {
            return Err(Error::internal(format!(
                "connection {} to {} was reused after a failed exchange",
                self.id, self.address
            )));
        }
        let max_message_size_bytes = self.stream_description()?.max_message_size_bytes;

        self.broken = true;
        let stream = &mut self.stream;
        let exchange = async move {
            message.write_to(stream).await?;
            if !message.expects_reply() {
                return Ok(None);
            }
            wire::read_reply(stream, message.request_id(), max_message_size_bytes)
                .await
                .map(Some)
        };
        let result = match deadline {
            Some(deadline) => {
                tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), exchange)
                    .await
                    .unwrap_or_else(|_| Err(Error::network_timeout()))
            }
            None => exchange.await,
        };

        match result {
            Err(ref e) if e.is_network_error() || e.is_invalid_response() => {}
            _ => self.broken = false,
        }
        result
    }
}
