use std::io::Read;

use crate::error::{Error, Result};

/// Little-endian reads from an in-memory frame. Running out of bytes means the frame was
/// truncated, which is a protocol error rather than an I/O failure.
pub(crate) trait SyncLittleEndianRead: Read {
    fn read_exact_frame(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf)
            .map_err(|_| Error::invalid_response("message frame is truncated"))
    }

    fn read_i32_sync(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact_frame(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32_sync(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_frame(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i64_sync(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact_frame(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_u8_sync(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_frame(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a null-terminated UTF-8 string.
    fn read_cstring_sync(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8_sync()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        String::from_utf8(bytes)
            .map_err(|e| Error::invalid_response(format!("invalid cstring: {e}")))
    }
}

impl<R: Read + ?Sized> SyncLittleEndianRead for R {}

pub(crate) fn write_cstring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.contains('\0') {
        return Err(Error::invalid_argument(format!(
            "cstring with interior null: {s:?}"
        )));
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

/// Reads one BSON document off the front of `reader`.
pub(crate) fn read_document(reader: &mut &[u8]) -> Result<bson::Document> {
    let bytes: &[u8] = *reader;
    if bytes.len() < 4 {
        return Err(Error::invalid_response("message frame is truncated"));
    }
    let length = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if length < 5 || length as usize > bytes.len() {
        return Err(Error::invalid_response(format!(
            "document length {length} does not fit in the remaining {} bytes",
            bytes.len()
        )));
    }
    let (mut doc_bytes, rest) = bytes.split_at(length as usize);
    let document = bson::Document::from_reader(&mut doc_bytes)?;
    *reader = rest;
    Ok(document)
}
