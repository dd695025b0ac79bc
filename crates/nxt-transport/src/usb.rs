//! USB transport driver (libusb bulk endpoints)
//!
//! Bricks enumerate with a fixed vendor/product signature and speak
//! 64-byte bulk transfers on endpoint 0x01 out / 0x82 in. libusb calls
//! block, so every call runs under `spawn_blocking`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, warn};

use crate::driver::{
    BrickId, BrickLink, BrickTransport, Candidate, CandidateAddr, ConnectionKind,
};
use crate::error::TransportError;

/// LEGO Group.
pub const VENDOR_ID: u16 = 0x0694;
/// NXT brick.
pub const PRODUCT_ID: u16 = 0x0002;

const EP_OUT: u8 = 0x01;
const EP_IN: u8 = 0x82;
const INTERFACE: u8 = 0;
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// USB driver over a shared libusb context.
pub struct UsbTransport {
    context: Context,
}

impl UsbTransport {
    pub fn new() -> Result<Self, TransportError> {
        let context = Context::new()
            .map_err(|e| TransportError::Unsupported(format!("libusb init: {e}")))?;
        Ok(Self { context })
    }
}

#[async_trait]
impl BrickTransport for UsbTransport {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Usb
    }

    async fn enumerate(&self) -> Result<Vec<Candidate>, TransportError> {
        let context = self.context.clone();
        tokio::task::spawn_blocking(move || enumerate_blocking(&context))
            .await
            .map_err(|e| TransportError::EnumerationFailed(format!("join: {e}")))?
    }

    async fn open(&self, candidate: &Candidate) -> Result<Box<dyn BrickLink>, TransportError> {
        let CandidateAddr::Usb { bus, address } = candidate.addr else {
            return Err(TransportError::OpenFailed(
                "not a USB candidate".to_string(),
            ));
        };
        let context = self.context.clone();
        let handle = tokio::task::spawn_blocking(move || open_blocking(&context, bus, address))
            .await
            .map_err(|e| TransportError::OpenFailed(format!("join: {e}")))??;
        debug!(bus, address, "USB link opened");
        Ok(Box::new(UsbLink {
            handle: Arc::new(handle),
        }))
    }
}

fn enumerate_blocking(context: &Context) -> Result<Vec<Candidate>, TransportError> {
    let devices = context
        .devices()
        .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;

    let mut candidates = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "skipping unreadable USB descriptor");
                continue;
            }
        };
        if descriptor.vendor_id() != VENDOR_ID || descriptor.product_id() != PRODUCT_ID {
            continue;
        }
        let bus = device.bus_number();
        let address = device.address();
        candidates.push(Candidate {
            id: BrickId::from_usb(bus, address),
            kind: ConnectionKind::Usb,
            name: None,
            addr: CandidateAddr::Usb { bus, address },
        });
    }
    Ok(candidates)
}

fn open_blocking(
    context: &Context,
    bus: u8,
    address: u8,
) -> Result<DeviceHandle<Context>, TransportError> {
    let devices = context
        .devices()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

    for device in devices.iter() {
        if device.bus_number() != bus || device.address() != address {
            continue;
        }
        let handle = device
            .open()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        handle
            .claim_interface(INTERFACE)
            .map_err(|e| TransportError::OpenFailed(format!("claim interface: {e}")))?;
        return Ok(handle);
    }
    Err(TransportError::NotFound)
}

/// Open bulk-endpoint link to one brick.
pub struct UsbLink {
    handle: Arc<DeviceHandle<Context>>,
}

#[async_trait]
impl BrickLink for UsbLink {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let handle = self.handle.clone();
        let buf = data.to_vec();
        tokio::task::spawn_blocking(move || handle.write_bulk(EP_OUT, &buf, IO_TIMEOUT))
            .await
            .map_err(|e| TransportError::SendFailed(format!("join: {e}")))?
            .map_err(map_io_error)
    }

    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; max_len.min(64).max(1)];
            let n = handle.read_bulk(EP_IN, &mut buf, IO_TIMEOUT)?;
            buf.truncate(n);
            Ok::<_, rusb::Error>(buf)
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("join: {e}")))?
        .map_err(map_io_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = handle.release_interface(INTERFACE) {
                debug!(error = %e, "release interface failed");
            }
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("join: {e}")))?;
        Ok(())
    }
}

fn map_io_error(e: rusb::Error) -> TransportError {
    match e {
        rusb::Error::Timeout => TransportError::Timeout("bulk transfer".to_string()),
        rusb::Error::NoDevice | rusb::Error::NotFound => TransportError::ConnectionClosed,
        other => TransportError::SendFailed(other.to_string()),
    }
}
