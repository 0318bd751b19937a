use bitflags::bitflags;
use bson::Document;

use super::{
    header::{Header, OpCode},
    util::{read_document, write_cstring, SyncLittleEndianRead},
};
use crate::error::{Error, Result};

bitflags! {
    /// Represents the bitwise flags for an OP_MSG as defined in the spec.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct MessageFlags: u32 {
        const CHECKSUM_PRESENT = 0b_0000_0000_0000_0000_0000_0000_0000_0001;
        const MORE_TO_COME     = 0b_0000_0000_0000_0000_0000_0000_0000_0010;
        const EXHAUST_ALLOWED  = 0b_0000_0000_0000_0001_0000_0000_0000_0000;
    }
}

/// A named batch of documents sent alongside the command document (payload type 1).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DocumentSequence {
    pub(crate) identifier: String,
    pub(crate) documents: Vec<Document>,
}

/// Represents an OP_MSG wire protocol operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Message {
    // OP_MSG payload type 0
    pub(crate) document_payload: Document,
    // OP_MSG payload type 1
    pub(crate) document_sequences: Vec<DocumentSequence>,
    pub(crate) response_to: i32,
    pub(crate) flags: MessageFlags,
    pub(crate) request_id: i32,
}

impl Message {
    /// Serializes the full frame, header included.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.flags.bits().to_le_bytes());

        body.push(0);
        self.document_payload.to_writer(&mut body)?;

        for sequence in &self.document_sequences {
            let mut section = Vec::new();
            write_cstring(&mut section, &sequence.identifier)?;
            for document in &sequence.documents {
                document.to_writer(&mut section)?;
            }
            let size = i32::try_from(section.len() + std::mem::size_of::<i32>())
                .map_err(|_| Error::invalid_argument("document sequence is too large"))?;

            body.push(1);
            body.extend_from_slice(&size.to_le_bytes());
            body.extend_from_slice(&section);
        }

        let header = Header {
            length: i32::try_from(Header::LENGTH + body.len())
                .map_err(|_| Error::invalid_argument("message is too large"))?,
            request_id: self.request_id,
            response_to: self.response_to,
            op_code: OpCode::Message,
        };

        let mut bytes = Vec::with_capacity(Header::LENGTH + body.len());
        header.write_to(&mut bytes);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes the body of an OP_MSG frame whose header has already been consumed.
    pub(crate) fn read_body(header: &Header, mut reader: &[u8]) -> Result<Self> {
        let flags = MessageFlags::from_bits_truncate(reader.read_u32_sync()?);

        let checksum_len = if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            std::mem::size_of::<u32>()
        } else {
            0
        };
        if reader.len() < checksum_len {
            return Err(Error::invalid_response("message frame is truncated"));
        }
        let (mut sections, _checksum) = reader.split_at(reader.len() - checksum_len);

        let mut document_payload = None;
        let mut document_sequences = Vec::new();
        while !sections.is_empty() {
            match sections.read_u8_sync()? {
                0 => {
                    if document_payload.is_some() {
                        return Err(Error::invalid_response(
                            "an OP_MSG must contain exactly one payload type 0 section",
                        ));
                    }
                    document_payload = Some(read_document(&mut sections)?);
                }
                1 => document_sequences.push(read_sequence(&mut sections)?),
                other => {
                    return Err(Error::invalid_response(format!(
                        "invalid OP_MSG section kind {other}"
                    )))
                }
            }
        }

        Ok(Self {
            document_payload: document_payload.ok_or_else(|| {
                Error::invalid_response("an OP_MSG must contain exactly one payload type 0 section")
            })?,
            document_sequences,
            response_to: header.response_to,
            flags,
            request_id: header.request_id,
        })
    }

    /// The command document with every document sequence folded back in as an array field.
    pub(crate) fn get_command_document(&self) -> Document {
        let mut command = self.document_payload.clone();
        for sequence in &self.document_sequences {
            command.insert(
                sequence.identifier.clone(),
                sequence
                    .documents
                    .iter()
                    .cloned()
                    .map(bson::Bson::Document)
                    .collect::<Vec<_>>(),
            );
        }
        command
    }
}

fn read_sequence(reader: &mut &[u8]) -> Result<DocumentSequence> {
    let size = reader.read_i32_sync()?;
    let remaining = usize::try_from(size)
        .ok()
        .and_then(|size| size.checked_sub(std::mem::size_of::<i32>()))
        .filter(|remaining| *remaining <= reader.len())
        .ok_or_else(|| Error::invalid_response(format!("invalid document sequence size {size}")))?;

    let bytes: &[u8] = *reader;
    let (mut section, rest) = bytes.split_at(remaining);
    *reader = rest;

    let identifier = section.read_cstring_sync()?;
    let mut documents = Vec::new();
    while !section.is_empty() {
        documents.push(read_document(&mut section)?);
    }

    Ok(DocumentSequence {
        identifier,
        documents,
    })
}
