//! Broker frame encoding and decoding
//!
//! Frame layout:
//!
//! ```text
//! +--------+-------------------------+------------------------+
//! | header | remaining length (1-4B) | body (remaining bytes) |
//! +--------+-------------------------+------------------------+
//! ```
//!
//! The remaining length uses MQTT-style base-128 continuation encoding.
//! Body strings are a u16 big-endian length followed by raw bytes; body
//! integers are u32 big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::ProtocolError;

/// One frame exchanged with a broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    command: u8,
    body: Bytes,
}

impl Packet {
    /// Create a packet from an opcode and a finished body
    pub fn new(command: u8, body: Bytes) -> Self {
        Self { command, body }
    }

    /// PINGREQ with an empty body
    pub fn ping_req() -> Self {
        Self::new(PINGREQ, Bytes::new())
    }

    /// PINGRESP with an empty body
    pub fn ping_resp() -> Self {
        Self::new(PINGRESP, Bytes::new())
    }

    /// PURE_PUB carrying publish id, topic and message
    pub fn pure_publish(
        publish_id: &str,
        topic: &str,
        message: &str,
    ) -> Result<Self, ProtocolError> {
        let mut body = BodyWriter::with_capacity(6 + publish_id.len() + topic.len() + message.len());
        body.put_string(publish_id)?;
        body.put_string(topic)?;
        body.put_string(message)?;
        Ok(Self::new(PURE_PUB, body.finish()))
    }

    /// QUERY_ONLINE for one topic
    pub fn query_online(topic: &str) -> Result<Self, ProtocolError> {
        let mut body = BodyWriter::with_capacity(2 + topic.len());
        body.put_string(topic)?;
        Ok(Self::new(QUERY_ONLINE, body.finish()))
    }

    /// QUERY_ONLINE_ACK carrying a count
    pub fn query_online_ack(online: u32) -> Self {
        let mut body = BodyWriter::with_capacity(4);
        body.put_u32(online);
        Self::new(QUERY_ONLINE_ACK, body.finish())
    }

    /// Opcode
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Raw body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body length as carried in the remaining-length field
    pub fn remaining_length(&self) -> usize {
        self.body.len()
    }

    /// Cursor over the body
    pub fn reader(&self) -> BodyReader {
        BodyReader::new(self.body.clone())
    }

    /// Fail unless this packet carries `expected`
    pub fn expect_command(&self, expected: u8) -> Result<(), ProtocolError> {
        if self.command != expected {
            return Err(ProtocolError::UnexpectedCommand {
                expected,
                actual: self.command,
            });
        }
        Ok(())
    }

    /// Decode a PURE_PUB body
    pub fn to_pure_publish(&self) -> Result<PurePublish, ProtocolError> {
        self.expect_command(PURE_PUB)?;
        let mut reader = self.reader();
        Ok(PurePublish {
            publish_id: reader.read_string()?,
            topic: reader.read_string()?,
            message: reader.read_string()?,
        })
    }

    /// Decode a QUERY_ONLINE body
    pub fn to_query_topic(&self) -> Result<String, ProtocolError> {
        self.expect_command(QUERY_ONLINE)?;
        self.reader().read_string()
    }

    /// Decode a QUERY_ONLINE_ACK body
    pub fn to_online_count(&self) -> Result<u32, ProtocolError> {
        self.expect_command(QUERY_ONLINE_ACK)?;
        self.reader().read_u32()
    }

    /// Append header, remaining length and body to `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.reserve(1 + MAX_LENGTH_BYTES + self.body.len());
        buf.put_u8(self.command);
        encode_remaining_length(self.body.len(), buf)?;
        buf.put_slice(&self.body);
        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one complete frame from the front of `buf`
    ///
    /// Returns `Ok(None)` if `buf` does not hold a whole frame yet; nothing is
    /// consumed in that case.
    pub fn decode(buf: &mut Bytes) -> Result<Option<Self>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }

        let header = buf[0];
        let (length, length_bytes) = match decode_remaining_length(&buf[1..])? {
            Some(v) => v,
            None => return Ok(None),
        };

        let frame_len = 1 + length_bytes + length;
        if buf.len() < frame_len {
            return Ok(None);
        }

        buf.advance(1 + length_bytes);
        let body = buf.split_to(length);
        Ok(Some(Self::new(header & COMMAND_MASK, body)))
    }
}

/// Decoded PURE_PUB fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurePublish {
    pub publish_id: String,
    pub topic: String,
    pub message: String,
}

/// Sequential body writer
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Write a u16-length-prefixed string
    pub fn put_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        let len = value.len();
        if len > u16::MAX as usize {
            return Err(ProtocolError::StringTooLong(len));
        }
        self.buf.put_u16(len as u16);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write a big-endian u32
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Sequential body reader
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read a u16-length-prefixed string
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.ensure(2)?;
        let len = self.buf.get_u16() as usize;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Read a big-endian u32
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }
}

/// Append the base-128 encoding of `length`
///
/// Zero still takes one explicit byte.
pub fn encode_remaining_length(length: usize, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    if length > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::MalformedLength);
    }

    let mut length = length;
    loop {
        let mut digit = (length % 128) as u8;
        length /= 128;
        if length > 0 {
            digit |= 0x80;
        }
        buf.put_u8(digit);
        if length == 0 {
            return Ok(());
        }
    }
}

/// Decode a remaining-length field from the front of `bytes`
///
/// Returns the value and how many bytes it occupied, or `None` when the
/// field is not complete yet.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;

    for (i, byte) in bytes.iter().enumerate() {
        if i >= MAX_LENGTH_BYTES {
            return Err(ProtocolError::MalformedLength);
        }
        value += (*byte & 0x7F) as usize * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if bytes.len() >= MAX_LENGTH_BYTES {
        return Err(ProtocolError::MalformedLength);
    }
    Ok(None)
}

/// Incremental remaining-length decoder for byte-at-a-time socket reads
#[derive(Debug)]
pub struct RemainingLength {
    value: usize,
    multiplier: usize,
    consumed: usize,
}

impl RemainingLength {
    pub fn new() -> Self {
        Self {
            value: 0,
            multiplier: 1,
            consumed: 0,
        }
    }

    /// Feed one byte; returns the final value once the continuation bit clears
    pub fn push(&mut self, byte: u8) -> Result<Option<usize>, ProtocolError> {
        if self.consumed >= MAX_LENGTH_BYTES {
            return Err(ProtocolError::MalformedLength);
        }
        self.value += (byte & 0x7F) as usize * self.multiplier;
        self.multiplier *= 128;
        self.consumed += 1;

        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}

impl Default for RemainingLength {
    fn default() -> Self {
        Self::new()
    }
}
