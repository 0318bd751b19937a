//! Framing of commands into wire messages and decoding of server replies.
//!
//! Two message shapes exist. Servers advertising `maxWireVersion >= 6` accept OP_MSG, a single
//! command document that carries `$db` and session metadata. Older servers only accept commands
//! as an OP_QUERY against the `<db>.$cmd` virtual collection and answer with OP_REPLY.

mod header;
mod message;
mod query;
#[cfg(test)]
mod test;
mod util;

use std::sync::atomic::{AtomicI32, Ordering};

use bson::Document;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[cfg(test)]
pub(crate) use self::query::ResponseFlags;
pub(crate) use self::{
    header::{Header, OpCode},
    message::{DocumentSequence, Message, MessageFlags},
    query::{Query, QueryFlags, Reply},
};
use super::command::Command;
use crate::error::{Error, Result};

/// The lowest max wire version that understands OP_MSG.
pub(crate) const GENERIC_COMMAND_MIN_WIRE_VERSION: i32 = 6;

/// Which framing a command is sent with. Chosen once per dispatch from the target server's
/// description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireShape {
    /// OP_QUERY against `<db>.$cmd`.
    Legacy,
    /// OP_MSG.
    GenericCommand,
}

impl WireShape {
    pub(crate) fn for_max_wire_version(max_wire_version: Option<i32>) -> Self {
        match max_wire_version {
            Some(version) if version >= GENERIC_COMMAND_MIN_WIRE_VERSION => Self::GenericCommand,
            _ => Self::Legacy,
        }
    }
}

/// Per-dispatch framing flags that do not belong to the command itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct FramingOptions {
    /// Allow a non-primary to answer (legacy shape only).
    pub(crate) secondary_ok: bool,
    /// The server sends no reply (generic shape only; unacknowledged writes).
    pub(crate) more_to_come: bool,
}

/// An outbound message in one of the two shapes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WireMessage {
    Legacy(Query),
    Generic(Message),
}

impl WireMessage {
    /// Frames `command` in the given shape. The generic shape carries `$db` and any session
    /// metadata set on the command; the legacy shape drops that metadata and inlines document
    /// sequences as arrays.
    pub(crate) fn build(
        command: &Command,
        shape: WireShape,
        framing: FramingOptions,
    ) -> Result<Self> {
        let request_id = next_request_id();
        match shape {
            WireShape::GenericCommand => {
                let mut flags = MessageFlags::empty();
                if framing.more_to_come {
                    flags |= MessageFlags::MORE_TO_COME;
                }
                Ok(Self::Generic(Message {
                    document_payload: command.generic_payload()?,
                    document_sequences: command.document_sequences.clone(),
                    response_to: 0,
                    flags,
                    request_id,
                }))
            }
            WireShape::Legacy => {
                let mut flags = QueryFlags::empty();
                if framing.secondary_ok {
                    flags |= QueryFlags::SECONDARY_OK;
                }
                Ok(Self::Legacy(Query::command(
                    &command.target_db,
                    command.legacy_query()?,
                    flags,
                    request_id,
                )))
            }
        }
    }

    pub(crate) fn request_id(&self) -> i32 {
        match self {
            Self::Legacy(query) => query.request_id,
            Self::Generic(message) => message.request_id,
        }
    }

    pub(crate) fn shape(&self) -> WireShape {
        match self {
            Self::Legacy(_) => WireShape::Legacy,
            Self::Generic(_) => WireShape::GenericCommand,
        }
    }

    /// Whether the server will answer this message.
    pub(crate) fn expects_reply(&self) -> bool {
        match self {
            Self::Legacy(_) => true,
            Self::Generic(message) => !message.flags.contains(MessageFlags::MORE_TO_COME),
        }
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Legacy(query) => query.to_bytes(),
            Self::Generic(message) => message.to_bytes(),
        }
    }

    /// Serializes the message and writes it to `writer` in one go.
    pub(crate) async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Reads one complete frame off `reader`. Stream failures are network errors; a length prefix
/// that cannot be a valid frame is a protocol error.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_message_size_bytes: i32,
) -> Result<Vec<u8>> {
    let length = reader.read_i32_le().await?;
    if length < Header::LENGTH as i32 {
        return Err(Error::invalid_response(format!(
            "message length {length} is shorter than a header"
        )));
    }
    if length > max_message_size_bytes {
        return Err(Error::invalid_response(format!(
            "message length {length} over maximum {max_message_size_bytes}"
        )));
    }

    let mut bytes = vec![0u8; length as usize];
    bytes[..4].copy_from_slice(&length.to_le_bytes());
    reader.read_exact(&mut bytes[4..]).await?;
    Ok(bytes)
}

/// A decoded reply frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedReply {
    pub(crate) response_to: i32,
    pub(crate) document: Document,
}

/// Decodes a complete reply frame (header included) into its reply document. Fails with an
/// invalid-response error on malformed or truncated frames.
pub(crate) fn parse_reply(bytes: &[u8]) -> Result<ParsedReply> {
    let mut reader = bytes;
    let header = Header::read_from(&mut reader)?;
    if usize::try_from(header.length).ok() != Some(bytes.len()) {
        return Err(Error::invalid_response(format!(
            "the server indicated that the reply would be {} bytes long, but it instead was {}",
            header.length,
            bytes.len()
        )));
    }

    let document = match header.op_code {
        OpCode::Message => Message::read_body(&header, reader)?.get_command_document(),
        OpCode::Reply => Reply::read_body(&header, reader)?.into_command_reply()?,
        OpCode::Query => {
            return Err(Error::invalid_response(
                "expected a reply opcode but got OP_QUERY",
            ))
        }
    };

    Ok(ParsedReply {
        response_to: header.response_to,
        document,
    })
}

/// Reads and decodes the reply to the request with id `request_id`.
pub(crate) async fn read_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
    request_id: i32,
    max_message_size_bytes: i32,
) -> Result<Document> {
    let bytes = read_frame(reader, max_message_size_bytes).await?;
    let reply = parse_reply(&bytes)?;
    if reply.response_to != request_id {
        return Err(Error::invalid_response(format!(
            "reply is for request {} but request {request_id} was sent",
            reply.response_to
        )));
    }
    Ok(reply.document)
}

static REQUEST_ID: AtomicI32 = AtomicI32::new(0);

/// Returns a new request id. Ids are unique per process and wrap on overflow.
pub(crate) fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}
