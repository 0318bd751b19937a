use bitflags::bitflags;
use bson::Document;

use super::{
    header::{Header, OpCode},
    util::{read_document, write_cstring, SyncLittleEndianRead},
};
use crate::error::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct QueryFlags: u32 {
        const TAILABLE_CURSOR   = 0b_0000_0010;
        const SECONDARY_OK      = 0b_0000_0100;
        const NO_CURSOR_TIMEOUT = 0b_0001_0000;
        const AWAIT_DATA        = 0b_0010_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ResponseFlags: u32 {
        const CURSOR_NOT_FOUND = 0b_0000_0001;
        const QUERY_FAILURE    = 0b_0000_0010;
        const AWAIT_CAPABLE    = 0b_0000_1000;
    }
}

/// Suffix of the virtual collection that legacy command queries target.
pub(crate) const COMMAND_COLLECTION: &str = "$cmd";

/// An OP_QUERY frame. Used only to run commands against servers that predate OP_MSG.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Query {
    pub(crate) request_id: i32,
    pub(crate) flags: QueryFlags,
    pub(crate) full_collection_name: String,
    pub(crate) num_to_skip: i32,
    pub(crate) num_to_return: i32,
    pub(crate) query: Document,
    pub(crate) return_field_selector: Option<Document>,
}

impl Query {
    /// A command query against `<db>.$cmd`, asking for a single reply document.
    pub(crate) fn command(db: &str, query: Document, flags: QueryFlags, request_id: i32) -> Self {
        Self {
            request_id,
            flags,
            full_collection_name: format!("{db}.{COMMAND_COLLECTION}"),
            num_to_skip: 0,
            num_to_return: -1,
            query,
            return_field_selector: None,
        }
    }

    /// Serializes the full frame, header included.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.flags.bits().to_le_bytes());
        write_cstring(&mut body, &self.full_collection_name)?;
        body.extend_from_slice(&self.num_to_skip.to_le_bytes());
        body.extend_from_slice(&self.num_to_return.to_le_bytes());
        self.query.to_writer(&mut body)?;
        if let Some(ref selector) = self.return_field_selector {
            selector.to_writer(&mut body)?;
        }

        let header = Header {
            length: i32::try_from(Header::LENGTH + body.len())
                .map_err(|_| Error::invalid_argument("message is too large"))?,
            request_id: self.request_id,
            response_to: 0,
            op_code: OpCode::Query,
        };

        let mut bytes = Vec::with_capacity(Header::LENGTH + body.len());
        header.write_to(&mut bytes);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    #[cfg(test)]
    pub(crate) fn read_body(header: &Header, mut reader: &[u8]) -> Result<Self> {
        let flags = QueryFlags::from_bits_truncate(reader.read_u32_sync()?);
        let full_collection_name = reader.read_cstring_sync()?;
        let num_to_skip = reader.read_i32_sync()?;
        let num_to_return = reader.read_i32_sync()?;
        let query = read_document(&mut reader)?;
        let return_field_selector = if reader.is_empty() {
            None
        } else {
            Some(read_document(&mut reader)?)
        };
        if !reader.is_empty() {
            return Err(Error::invalid_response("trailing bytes after OP_QUERY"));
        }

        Ok(Self {
            request_id: header.request_id,
            flags,
            full_collection_name,
            num_to_skip,
            num_to_return,
            query,
            return_field_selector,
        })
    }
}

/// An OP_REPLY frame, the legacy answer to an OP_QUERY.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reply {
    pub(crate) response_to: i32,
    pub(crate) response_flags: ResponseFlags,
    pub(crate) cursor_id: i64,
    pub(crate) starting_from: i32,
    pub(crate) num_returned: i32,
    pub(crate) docs: Vec<Document>,
}

impl Reply {
    /// Decodes the body of an OP_REPLY frame whose header has already been consumed.
    pub(crate) fn read_body(header: &Header, mut reader: &[u8]) -> Result<Self> {
        let response_flags = ResponseFlags::from_bits_truncate(reader.read_u32_sync()?);
        let cursor_id = reader.read_i64_sync()?;
        let starting_from = reader.read_i32_sync()?;
        let num_returned = reader.read_i32_sync()?;

        let mut docs = Vec::new();
        while !reader.is_empty() {
            docs.push(read_document(&mut reader)?);
        }

        if usize::try_from(num_returned).ok() != Some(docs.len()) {
            return Err(Error::invalid_response(format!(
                "OP_REPLY claims {num_returned} documents but carries {}",
                docs.len()
            )));
        }

        Ok(Self {
            response_to: header.response_to,
            response_flags,
            cursor_id,
            starting_from,
            num_returned,
            docs,
        })
    }

    /// The single command reply document. A query failure is turned into an `ok: 0` reply so
    /// that it is validated like any other command failure.
    pub(crate) fn into_command_reply(mut self) -> Result<Document> {
        if self.docs.len() != 1 {
            return Err(Error::invalid_response(format!(
                "expected exactly one document in a command reply, got {}",
                self.docs.len()
            )));
        }
        let mut reply = self.docs.remove(0);

        if self.response_flags.contains(ResponseFlags::QUERY_FAILURE) {
            let message = reply
                .get_str("$err")
                .map(String::from)
                .unwrap_or_else(|_| "query failure".to_string());
            let code = reply.get_i32("code").unwrap_or(0);
            reply = bson::doc! { "ok": 0, "errmsg": message, "code": code };
        }

        Ok(reply)
    }

    #[cfg(test)]
    pub(crate) fn to_bytes(&self, request_id: i32) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.response_flags.bits().to_le_bytes());
        body.extend_from_slice(&self.cursor_id.to_le_bytes());
        body.extend_from_slice(&self.starting_from.to_le_bytes());
        body.extend_from_slice(&self.num_returned.to_le_bytes());
        for doc in &self.docs {
            doc.to_writer(&mut body)?;
        }

        let header = Header {
            length: i32::try_from(Header::LENGTH + body.len())
                .map_err(|_| Error::invalid_argument("message is too large"))?,
            request_id,
            response_to: self.response_to,
            op_code: OpCode::Reply,
        };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}
