//! Session wire protocol between client libraries and the gateway
//!
//! Every packet starts with a fixed 24-byte header: a 4-byte magic, a
//! command byte (high bit = direction, server replies set it), a u16
//! big-endian total packet size, an error byte and a 16-byte password
//! field. The payload layout depends on the command. Integers at this
//! layer are big-endian throughout; this is independent of the
//! little-endian encoding inside the brick telegrams a SEND may carry.

mod codec;
mod packet;

pub use codec::{
    decode_reply, decode_request, encode_raw_reply, encode_reply, encode_request,
    header_password, header_payload_len, WireCodecError,
};
pub use packet::{BrickEntry, Command, Password, Reply, Request, WireStatus};

/// Packet signature.
pub const MAGIC: [u8; 4] = *b"NXT\0";

/// Fixed header length.
pub const HEADER_LEN: usize = 24;

/// Upper bound on a whole packet; anything larger is structurally
/// invalid and closes the connection.
pub const MAX_PACKET: usize = 4096;

/// Direction bit of the command byte; set on server-to-client replies.
pub const REPLY_FLAG: u8 = 0x80;

/// Width of the password field.
pub const PASSWORD_LEN: usize = 16;

/// Width of a brick name field in LIST replies.
pub const NAME_LEN: usize = 16;

/// Default gateway TCP port.
pub const DEFAULT_PORT: u16 = 13370;
