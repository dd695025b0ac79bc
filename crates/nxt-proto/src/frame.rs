//! Telegram framing: command builder and reply parser
//!
//! A command telegram is `[kind, opcode, payload...]`, at most 64 bytes.
//! A reply telegram is `[0x02, opcode-echo, status, payload...]`. Payload
//! integers are little-endian; strings are fixed-length and NUL-padded.

use crate::error::ProtoError;
use crate::status::BrickStatus;

/// Single-transfer limit for this protocol family.
pub const MAX_TELEGRAM: usize = 64;

/// First byte of every reply telegram.
pub const REPLY_MARKER: u8 = 0x02;

/// Telegram kind byte. The high bit suppresses the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelegramKind {
    DirectReply = 0x00,
    SystemReply = 0x01,
    DirectNoReply = 0x80,
    SystemNoReply = 0x81,
}

impl TelegramKind {
    /// Whether the brick will answer this telegram.
    pub fn wants_reply(self) -> bool {
        matches!(self, Self::DirectReply | Self::SystemReply)
    }

    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// One outgoing command telegram. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    kind: TelegramKind,
    opcode: u8,
    payload: Vec<u8>,
}

impl CommandFrame {
    pub fn kind(&self) -> TelegramKind {
        self.kind
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn wants_reply(&self) -> bool {
        self.kind.wants_reply()
    }

    /// Serialize into the outgoing buffer handed to a transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.payload.len());
        buf.push(self.kind.byte());
        buf.push(self.opcode);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Builds a [`CommandFrame`] by appending parameters in declared order.
///
/// Overlong input is detected at `build()` so the push methods chain
/// without intermediate `Result`s.
#[derive(Debug)]
pub struct CommandBuilder {
    kind: TelegramKind,
    opcode: u8,
    payload: Vec<u8>,
    oversize_string: Option<(usize, usize)>,
}

impl CommandBuilder {
    pub fn new(kind: TelegramKind, opcode: u8) -> Self {
        Self {
            kind,
            opcode,
            payload: Vec::new(),
            oversize_string: None,
        }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.payload.push(value);
        self
    }

    pub fn u16_le(mut self, value: u16) -> Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32_le(mut self, value: u32) -> Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Fixed-length NUL-padded string field of `field` bytes. The string
    /// must leave room for at least one terminating NUL.
    pub fn str_padded(mut self, value: &str, field: usize) -> Self {
        let bytes = value.as_bytes();
        if bytes.len() >= field {
            self.oversize_string = Some((bytes.len(), field));
            return self;
        }
        self.payload.extend_from_slice(bytes);
        self.payload.extend(std::iter::repeat(0).take(field - bytes.len()));
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.payload.extend_from_slice(value);
        self
    }

    pub fn build(self) -> Result<CommandFrame, ProtoError> {
        if let Some((len, field)) = self.oversize_string {
            return Err(ProtoError::StringTooLong { len, field });
        }
        let total = 2 + self.payload.len();
        if total > MAX_TELEGRAM {
            return Err(ProtoError::TelegramTooLong {
                len: total,
                limit: MAX_TELEGRAM,
            });
        }
        Ok(CommandFrame {
            kind: self.kind,
            opcode: self.opcode,
            payload: self.payload,
        })
    }
}

/// A parsed reply telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub opcode: u8,
    pub status: BrickStatus,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn reader(&self) -> ReplyReader<'_> {
        ReplyReader {
            payload: &self.payload,
            pos: 0,
        }
    }
}

/// Parse a reply against the command it answers. Fails on a marker or
/// opcode mismatch, and on any non-zero status byte.
pub fn parse_reply(sent: &CommandFrame, raw: &[u8]) -> Result<Reply, ProtoError> {
    let reply = parse_reply_lenient(sent, raw)?;
    if !reply.status.is_success() {
        return Err(ProtoError::Brick {
            opcode: reply.opcode,
            status: reply.status,
        });
    }
    Ok(reply)
}

/// Like [`parse_reply`] but keeps the payload on a non-zero status, for
/// the few operations that return data alongside an error code.
pub fn parse_reply_lenient(sent: &CommandFrame, raw: &[u8]) -> Result<Reply, ProtoError> {
    if raw.len() < 3 {
        return Err(ProtoError::Truncated {
            needed: 3 - raw.len(),
        });
    }
    if raw[0] != REPLY_MARKER {
        return Err(ProtoError::Mismatch(format!(
            "expected reply marker 0x{:02X}, got 0x{:02X}",
            REPLY_MARKER, raw[0]
        )));
    }
    if raw[1] != sent.opcode() {
        return Err(ProtoError::Mismatch(format!(
            "opcode echo 0x{:02X} does not match request 0x{:02X}",
            raw[1],
            sent.opcode()
        )));
    }
    Ok(Reply {
        opcode: raw[1],
        status: BrickStatus::from(raw[2]),
        payload: raw[3..].to_vec(),
    })
}

/// Cursor over a reply payload, consuming fields in the order the caller
/// expects them.
#[derive(Debug)]
pub struct ReplyReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> ReplyReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos + n;
        if end > self.payload.len() {
            return Err(ProtoError::Truncated {
                needed: end - self.payload.len(),
            });
        }
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, ProtoError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32, ProtoError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Fixed-length string field, trimmed at the first NUL.
    pub fn str_trimmed(&mut self, field: usize) -> Result<String, ProtoError> {
        let raw = self.take(field)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        self.take(n)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.payload[self.pos..];
        self.pos = self.payload.len();
        slice
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.pos
    }
}
