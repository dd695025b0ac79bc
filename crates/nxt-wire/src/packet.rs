//! Packet model: commands, status codes, request/reply unions.

use std::fmt;

use crate::{NAME_LEN, PASSWORD_LEN};

/// Session command carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Enumerate registered bricks.
    List = 1,
    /// Forward one telegram to a brick.
    Send = 2,
    /// Read one telegram back from a brick.
    Recv = 3,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Command::List),
            2 => Some(Command::Send),
            3 => Some(Command::Recv),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::List => "LIST",
            Command::Send => "SEND",
            Command::Recv => "RECV",
        };
        f.write_str(name)
    }
}

/// Outcome carried in the header's error byte of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStatus {
    Ok,
    WrongPassword,
    UnknownCommand,
    NoSuchHandle,
    /// The brick link failed while serving the command; the gateway has
    /// evicted the device.
    Transport,
    Unknown(u8),
}

impl From<u8> for WireStatus {
    fn from(b: u8) -> Self {
        match b {
            0 => WireStatus::Ok,
            1 => WireStatus::WrongPassword,
            2 => WireStatus::UnknownCommand,
            3 => WireStatus::NoSuchHandle,
            4 => WireStatus::Transport,
            other => WireStatus::Unknown(other),
        }
    }
}

impl From<WireStatus> for u8 {
    fn from(s: WireStatus) -> Self {
        match s {
            WireStatus::Ok => 0,
            WireStatus::WrongPassword => 1,
            WireStatus::UnknownCommand => 2,
            WireStatus::NoSuchHandle => 3,
            WireStatus::Transport => 4,
            WireStatus::Unknown(b) => b,
        }
    }
}

impl fmt::Display for WireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireStatus::Ok => write!(f, "ok"),
            WireStatus::WrongPassword => write!(f, "wrong password"),
            WireStatus::UnknownCommand => write!(f, "unknown command"),
            WireStatus::NoSuchHandle => write!(f, "no such handle"),
            WireStatus::Transport => write!(f, "transport failure"),
            WireStatus::Unknown(b) => write!(f, "unknown status 0x{b:02X}"),
        }
    }
}

/// Fixed-width shared secret. Built from a UTF-8 string by NUL-padding
/// (or truncating) to 16 bytes; compared bytewise.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Password(pub [u8; PASSWORD_LEN]);

impl Password {
    pub const fn empty() -> Self {
        Password([0u8; PASSWORD_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        let mut field = [0u8; PASSWORD_LEN];
        let raw = s.as_bytes();
        let take = raw.len().min(PASSWORD_LEN);
        field[..take].copy_from_slice(&raw[..take]);
        Password(field)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the secret itself.
        f.write_str("Password(..)")
    }
}

/// One registered brick as presented over LIST. A fixed 24-byte record
/// on the wire: handle, connection-kind byte, 6-byte hardware id,
/// NUL-padded name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrickEntry {
    pub handle: u8,
    pub is_bt: bool,
    pub id: [u8; 6],
    pub name: [u8; NAME_LEN],
}

impl BrickEntry {
    /// Name with trailing NULs stripped, lossily decoded.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Client-to-server packet body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Send { handle: u8, data: Vec<u8> },
    Recv { handle: u8, max_len: u16 },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::List => Command::List,
            Request::Send { .. } => Command::Send,
            Request::Recv { .. } => Command::Recv,
        }
    }
}

/// Server-to-client packet body. `Empty` is the shape of every error
/// reply: header only, status in the error byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    List { bricks: Vec<BrickEntry> },
    Send { written: u16 },
    Recv { data: Vec<u8> },
    Empty,
}
