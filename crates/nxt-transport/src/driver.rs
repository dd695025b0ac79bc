//! Transport driver traits and addressing types

use std::fmt;

use async_trait::async_trait;

use crate::error::TransportError;

/// How a brick is physically attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Usb,
    Bluetooth,
}

impl ConnectionKind {
    pub fn is_bluetooth(self) -> bool {
        self == Self::Bluetooth
    }

    /// Wire byte used in LIST replies.
    pub fn wire_byte(self) -> u8 {
        match self {
            Self::Usb => 0,
            Self::Bluetooth => 1,
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Bluetooth => write!(f, "bluetooth"),
        }
    }
}

/// Six-byte hardware identifier: the Bluetooth address, or a
/// bus/address-derived stand-in for USB devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BrickId(pub [u8; 6]);

impl BrickId {
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Stand-in id for a USB device, from its bus number and address.
    pub fn from_usb(bus: u8, address: u8) -> Self {
        Self([0, 0, 0, 0, bus, address])
    }
}

impl From<[u8; 6]> for BrickId {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BrickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Driver-specific address needed to reopen a candidate later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateAddr {
    Usb { bus: u8, address: u8 },
    Bluetooth { addr: [u8; 6] },
    /// Index into the mock bus.
    Mock { index: usize },
}

/// One device a transport found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: BrickId,
    pub kind: ConnectionKind,
    /// Name if the transport can resolve it without opening the device
    /// (Bluetooth inquiry does, USB does not).
    pub name: Option<String>,
    pub addr: CandidateAddr,
}

/// One transport family (USB, Bluetooth, mock).
#[async_trait]
pub trait BrickTransport: Send + Sync {
    fn kind(&self) -> ConnectionKind;

    /// Scan for bricks matching this transport's fixed signature.
    async fn enumerate(&self) -> Result<Vec<Candidate>, TransportError>;

    /// Open a live link to one candidate.
    async fn open(&self, candidate: &Candidate) -> Result<Box<dyn BrickLink>, TransportError>;
}

/// An open byte channel to one brick. Calls may block up to the driver's
/// per-call timeout (1-2 s); any failure means the device is gone.
#[async_trait]
pub trait BrickLink: Send + Sync {
    /// Write one outgoing telegram, returning the bytes accepted.
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes of one incoming telegram.
    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
