//! Command/reply telegram codec for NXT bricks
//!
//! This crate implements the brick's native binary protocol: telegram
//! framing, typed little-endian parameters, the firmware status-code
//! enumeration, builders for the handful of telegrams the gateway and
//! client library need, and the chunked bus sub-protocol used by
//! secondary sensors on the shared low-speed bus.
//!
//! The session (TCP) wire protocol lives in `nxt-wire`; the two layers
//! deliberately share no byte-order helpers, since telegram payloads are
//! little-endian while the session header is big-endian.

pub mod bus;
pub mod commands;
mod error;
mod frame;
mod status;

pub use bus::Exchange;
pub use error::ProtoError;
pub use frame::{
    parse_reply, parse_reply_lenient, CommandBuilder, CommandFrame, Reply, ReplyReader,
    TelegramKind, MAX_TELEGRAM, REPLY_MARKER,
};
pub use status::BrickStatus;

/// Wire code the gateway uses for a lost connection, outside the
/// one-byte firmware status space.
pub const CONNECTION_ERROR_CODE: u16 = 0x0100;

/// Direct and system command opcodes used by this stack.
///
/// The full firmware opcode space is much larger; secondary-sensor and
/// file-system opcodes belong to external collaborators.
pub mod opcode {
    /// Read battery voltage in millivolts (direct)
    pub const GET_BATTERY_LEVEL: u8 = 0x0B;
    /// Keep-alive; also the minimal liveness probe (direct)
    pub const KEEP_ALIVE: u8 = 0x0D;
    /// Bus status poll: bytes ready on a low-speed port (direct)
    pub const LS_GET_STATUS: u8 = 0x0E;
    /// Bus write transaction (direct)
    pub const LS_WRITE: u8 = 0x0F;
    /// Bus read transaction (direct)
    pub const LS_READ: u8 = 0x10;
    /// Firmware and protocol version (system)
    pub const GET_FIRMWARE_VERSION: u8 = 0x88;
    /// Rename the brick (system)
    pub const SET_BRICK_NAME: u8 = 0x98;
    /// Name, Bluetooth address, signal strength, free flash (system)
    pub const GET_DEVICE_INFO: u8 = 0x9B;
}
