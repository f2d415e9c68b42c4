//! Message Body Buffers
//!
//! ## Purpose
//!
//! [`BodyBuilder`] accumulates an outbound body incrementally; [`BodyReader`]
//! consumes an inbound body that arrived as one or more segments. Integers are
//! big-endian. Strings and byte blobs are prefixed with a `u32` length.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Growable outbound body
#[derive(Debug, Default, Clone)]
pub struct BodyBuilder {
    buf: BytesMut,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(value as u8);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    /// Length-prefixed byte blob
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    /// Length-prefixed UTF-8 string
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over an inbound body
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    /// Wrap the body segments. A single segment is used as-is; several are
    /// joined once.
    pub fn new(mut segments: Vec<Bytes>) -> Self {
        let buf = match segments.len() {
            0 => Bytes::new(),
            1 => segments.remove(0),
            _ => {
                let total = segments.iter().map(Bytes::len).sum();
                let mut joined = BytesMut::with_capacity(total);
                for segment in &segments {
                    joined.put_slice(segment);
                }
                joined.freeze()
            }
        };
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    #[inline]
    fn ensure(&self, need: usize, context: &'static str) -> ProtocolResult<()> {
        if self.buf.remaining() < need {
            return Err(ProtocolError::body_underflow(
                need,
                self.buf.remaining(),
                context,
            ));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> ProtocolResult<u8> {
        self.ensure(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn get_bool(&mut self) -> ProtocolResult<bool> {
        self.ensure(1, "bool")?;
        match self.buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::invalid_payload(
                "bool",
                format!("byte {other} is not 0 or 1"),
            )),
        }
    }

    pub fn get_u16(&mut self) -> ProtocolResult<u16> {
        self.ensure(2, "u16")?;
        Ok(self.buf.get_u16())
    }

    pub fn get_u32(&mut self) -> ProtocolResult<u32> {
        self.ensure(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn get_u64(&mut self) -> ProtocolResult<u64> {
        self.ensure(8, "u64")?;
        Ok(self.buf.get_u64())
    }

    pub fn get_i32(&mut self) -> ProtocolResult<i32> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn get_i64(&mut self) -> ProtocolResult<i64> {
        self.ensure(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn get_bytes(&mut self) -> ProtocolResult<Bytes> {
        let len = self.get_u32()? as usize;
        self.ensure(len, "byte blob")?;
        Ok(self.buf.split_to(len))
    }

    pub fn get_string(&mut self) -> ProtocolResult<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::invalid_payload("string", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_spans_segments() {
        let mut builder = BodyBuilder::new();
        builder.put_u64(0xDEAD_BEEF).put_str("lock-7").put_bool(true);
        let body = builder.freeze();

        let (a, b) = (body.slice(..5), body.slice(5..));
        let mut reader = BodyReader::new(vec![a, b]);
        assert_eq!(reader.get_u64().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.get_string().unwrap(), "lock-7");
        assert!(reader.get_bool().unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_underflow_reports_context() {
        let mut reader = BodyReader::new(vec![Bytes::from_static(&[0, 1])]);
        assert_eq!(
            reader.get_u32().unwrap_err(),
            ProtocolError::body_underflow(4, 2, "u32")
        );
    }

    #[test]
    fn test_truncated_blob() {
        let mut builder = BodyBuilder::new();
        builder.put_u32(10).put_u8(1);
        let mut reader = BodyReader::new(vec![builder.freeze()]);
        assert!(matches!(
            reader.get_bytes(),
            Err(ProtocolError::BodyUnderflow { need: 10, remaining: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let mut reader = BodyReader::new(vec![Bytes::from_static(&[7])]);
        assert!(matches!(
            reader.get_bool(),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }
}
