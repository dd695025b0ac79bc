//! Brick firmware status codes

use std::fmt;

/// Status byte of a reply telegram. Zero is success; everything else is a
/// brick-reported error. Codes below 0x80 come from the communication
/// module, the rest from the command interpreter and file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrickStatus {
    Success,

    // Communication module
    PendingCommunication,
    QueueEmpty,

    // File system
    NoMoreHandles,
    NoSpace,
    NoMoreFiles,
    EndOfFileExpected,
    EndOfFile,
    NotLinearFile,
    FileNotFound,
    HandleAlreadyClosed,
    NoLinearSpace,
    UndefinedError,
    FileBusy,
    NoWriteBuffers,
    AppendNotPossible,
    FileFull,
    FileExists,
    ModuleNotFound,
    OutOfBoundary,
    IllegalFileName,
    IllegalHandle,

    // Command interpreter
    RequestFailed,
    UnknownCommand,
    InsanePacket,
    OutOfRange,
    BusError,
    CommBufferFull,
    InvalidChannel,
    ChannelBusy,
    NoActiveProgram,
    IllegalSize,
    IllegalMailboxQueue,
    InvalidField,
    BadInputOutput,
    InsufficientMemory,
    BadArguments,

    /// Reserved or firmware-specific code
    Unknown(u8),
}

impl From<u8> for BrickStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x20 => Self::PendingCommunication,
            0x40 => Self::QueueEmpty,
            0x81 => Self::NoMoreHandles,
            0x82 => Self::NoSpace,
            0x83 => Self::NoMoreFiles,
            0x84 => Self::EndOfFileExpected,
            0x85 => Self::EndOfFile,
            0x86 => Self::NotLinearFile,
            0x87 => Self::FileNotFound,
            0x88 => Self::HandleAlreadyClosed,
            0x89 => Self::NoLinearSpace,
            0x8A => Self::UndefinedError,
            0x8B => Self::FileBusy,
            0x8C => Self::NoWriteBuffers,
            0x8D => Self::AppendNotPossible,
            0x8E => Self::FileFull,
            0x8F => Self::FileExists,
            0x90 => Self::ModuleNotFound,
            0x91 => Self::OutOfBoundary,
            0x92 => Self::IllegalFileName,
            0x93 => Self::IllegalHandle,
            0xBD => Self::RequestFailed,
            0xBE => Self::UnknownCommand,
            0xBF => Self::InsanePacket,
            0xC0 => Self::OutOfRange,
            0xDD => Self::BusError,
            0xDE => Self::CommBufferFull,
            0xDF => Self::InvalidChannel,
            0xE0 => Self::ChannelBusy,
            0xEC => Self::NoActiveProgram,
            0xED => Self::IllegalSize,
            0xEE => Self::IllegalMailboxQueue,
            0xEF => Self::InvalidField,
            0xF0 => Self::BadInputOutput,
            0xFB => Self::InsufficientMemory,
            0xFF => Self::BadArguments,
            other => Self::Unknown(other),
        }
    }
}

impl From<BrickStatus> for u8 {
    fn from(status: BrickStatus) -> Self {
        match status {
            BrickStatus::Success => 0x00,
            BrickStatus::PendingCommunication => 0x20,
            BrickStatus::QueueEmpty => 0x40,
            BrickStatus::NoMoreHandles => 0x81,
            BrickStatus::NoSpace => 0x82,
            BrickStatus::NoMoreFiles => 0x83,
            BrickStatus::EndOfFileExpected => 0x84,
            BrickStatus::EndOfFile => 0x85,
            BrickStatus::NotLinearFile => 0x86,
            BrickStatus::FileNotFound => 0x87,
            BrickStatus::HandleAlreadyClosed => 0x88,
            BrickStatus::NoLinearSpace => 0x89,
            BrickStatus::UndefinedError => 0x8A,
            BrickStatus::FileBusy => 0x8B,
            BrickStatus::NoWriteBuffers => 0x8C,
            BrickStatus::AppendNotPossible => 0x8D,
            BrickStatus::FileFull => 0x8E,
            BrickStatus::FileExists => 0x8F,
            BrickStatus::ModuleNotFound => 0x90,
            BrickStatus::OutOfBoundary => 0x91,
            BrickStatus::IllegalFileName => 0x92,
            BrickStatus::IllegalHandle => 0x93,
            BrickStatus::RequestFailed => 0xBD,
            BrickStatus::UnknownCommand => 0xBE,
            BrickStatus::InsanePacket => 0xBF,
            BrickStatus::OutOfRange => 0xC0,
            BrickStatus::BusError => 0xDD,
            BrickStatus::CommBufferFull => 0xDE,
            BrickStatus::InvalidChannel => 0xDF,
            BrickStatus::ChannelBusy => 0xE0,
            BrickStatus::NoActiveProgram => 0xEC,
            BrickStatus::IllegalSize => 0xED,
            BrickStatus::IllegalMailboxQueue => 0xEE,
            BrickStatus::InvalidField => 0xEF,
            BrickStatus::BadInputOutput => 0xF0,
            BrickStatus::InsufficientMemory => 0xFB,
            BrickStatus::BadArguments => 0xFF,
            BrickStatus::Unknown(v) => v,
        }
    }
}

impl BrickStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::UpperHex for BrickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: u8 = (*self).into();
        fmt::UpperHex::fmt(&value, f)
    }
}

impl fmt::Display for BrickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::PendingCommunication => write!(f, "PendingCommunication"),
            Self::QueueEmpty => write!(f, "QueueEmpty"),
            Self::NoMoreHandles => write!(f, "NoMoreHandles"),
            Self::NoSpace => write!(f, "NoSpace"),
            Self::NoMoreFiles => write!(f, "NoMoreFiles"),
            Self::EndOfFileExpected => write!(f, "EndOfFileExpected"),
            Self::EndOfFile => write!(f, "EndOfFile"),
            Self::NotLinearFile => write!(f, "NotLinearFile"),
            Self::FileNotFound => write!(f, "FileNotFound"),
            Self::HandleAlreadyClosed => write!(f, "HandleAlreadyClosed"),
            Self::NoLinearSpace => write!(f, "NoLinearSpace"),
            Self::UndefinedError => write!(f, "UndefinedError"),
            Self::FileBusy => write!(f, "FileBusy"),
            Self::NoWriteBuffers => write!(f, "NoWriteBuffers"),
            Self::AppendNotPossible => write!(f, "AppendNotPossible"),
            Self::FileFull => write!(f, "FileFull"),
            Self::FileExists => write!(f, "FileExists"),
            Self::ModuleNotFound => write!(f, "ModuleNotFound"),
            Self::OutOfBoundary => write!(f, "OutOfBoundary"),
            Self::IllegalFileName => write!(f, "IllegalFileName"),
            Self::IllegalHandle => write!(f, "IllegalHandle"),
            Self::RequestFailed => write!(f, "RequestFailed"),
            Self::UnknownCommand => write!(f, "UnknownCommand"),
            Self::InsanePacket => write!(f, "InsanePacket"),
            Self::OutOfRange => write!(f, "OutOfRange"),
            Self::BusError => write!(f, "BusError"),
            Self::CommBufferFull => write!(f, "CommBufferFull"),
            Self::InvalidChannel => write!(f, "InvalidChannel"),
            Self::ChannelBusy => write!(f, "ChannelBusy"),
            Self::NoActiveProgram => write!(f, "NoActiveProgram"),
            Self::IllegalSize => write!(f, "IllegalSize"),
            Self::IllegalMailboxQueue => write!(f, "IllegalMailboxQueue"),
            Self::InvalidField => write!(f, "InvalidField"),
            Self::BadInputOutput => write!(f, "BadInputOutput"),
            Self::InsufficientMemory => write!(f, "InsufficientMemory"),
            Self::BadArguments => write!(f, "BadArguments"),
            Self::Unknown(v) => write!(f, "Unknown(0x{:02X})", v),
        }
    }
}
