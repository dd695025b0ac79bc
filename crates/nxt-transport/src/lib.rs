//! Transport drivers for NXT bricks
//!
//! The rest of the stack depends only on the [`BrickTransport`] and
//! [`BrickLink`] traits: enumerate candidates, open one, move raw bytes,
//! close. Whether the concrete driver is a USB access library or a
//! Bluetooth host stack is invisible above this crate.
//!
//! Drivers:
//! - USB bulk endpoints (`usb` feature, libusb via `rusb`)
//! - Bluetooth RFCOMM with a length-prefixed mini-frame (`bluetooth`
//!   feature, Linux only, BlueZ via `bluer`)
//! - Scripted mock bus for tests and demo mode (always compiled)

mod driver;
pub mod error;
pub mod mock;

#[cfg(feature = "usb")]
pub mod usb;

#[cfg(all(target_os = "linux", feature = "bluetooth"))]
pub mod bluetooth;

pub use driver::{BrickId, BrickLink, BrickTransport, Candidate, CandidateAddr, ConnectionKind};
pub use error::TransportError;

use std::sync::Arc;

/// The set of enabled transports, shared by the discovery scanner and the
/// gateway's open-on-demand path.
#[derive(Clone, Default)]
pub struct TransportSet {
    transports: Vec<Arc<dyn BrickTransport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transport: Arc<dyn BrickTransport>) {
        self.transports.push(transport);
    }

    pub fn for_kind(&self, kind: ConnectionKind) -> Option<&Arc<dyn BrickTransport>> {
        self.transports.iter().find(|t| t.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn BrickTransport>> {
        self.transports.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
