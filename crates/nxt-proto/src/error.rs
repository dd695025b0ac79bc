//! Protocol-layer errors

use thiserror::Error;

use crate::status::BrickStatus;
use crate::CONNECTION_ERROR_CODE;

#[derive(Debug, Error, Clone)]
pub enum ProtoError {
    /// The brick answered with a non-zero status byte.
    #[error("brick error: {status} (0x{status:02X}) for opcode 0x{opcode:02X}")]
    Brick { opcode: u8, status: BrickStatus },

    /// Reply marker or opcode echo did not match the request.
    #[error("protocol mismatch: {0}")]
    Mismatch(String),

    /// Reply payload ended before the expected field.
    #[error("reply truncated: needed {needed} more byte(s)")]
    Truncated { needed: usize },

    /// Built telegram would exceed the single-transfer limit.
    #[error("telegram too long: {len} bytes (limit {limit})")]
    TelegramTooLong { len: usize, limit: usize },

    /// Fixed-length string parameter does not fit its declared field.
    #[error("string parameter too long: {len} bytes for a {field}-byte field")]
    StringTooLong { len: usize, field: usize },

    /// Bus port outside 0..=3.
    #[error("invalid bus port: {0}")]
    InvalidPort(u8),

    /// Bus status poll expired before the expected bytes were ready.
    #[error("bus timeout on port {port}: {ready} of {expected} byte(s) ready")]
    BusTimeout { port: u8, ready: u8, expected: u8 },

    /// The link to the brick failed mid-exchange.
    #[error("connection to brick lost: {0}")]
    ConnectionLost(String),
}

impl ProtoError {
    /// Numeric code as reported over the session protocol. Brick-reported
    /// statuses map to their one-byte code, link failures to the
    /// gateway-local connection-error code.
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::Brick { status, .. } => u8::from(*status) as u16,
            _ => CONNECTION_ERROR_CODE,
        }
    }
}
