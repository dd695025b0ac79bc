//! Bluetooth transport driver (BlueZ RFCOMM)
//!
//! Bricks are found by inquiry and filtered by their fixed 3-byte device
//! class. The byte stream on RFCOMM channel 1 carries one telegram per
//! mini-frame: a little-endian u16 length prefix followed by the body.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::driver::{
    BrickId, BrickLink, BrickTransport, Candidate, CandidateAddr, ConnectionKind,
};
use crate::error::TransportError;

/// Fixed 3-byte device class a brick announces (toy / robot).
pub const DEVICE_CLASS: u32 = 0x000804;

const RFCOMM_CHANNEL: u8 = 1;
const INQUIRY_WINDOW: Duration = Duration::from_secs(4);
const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Bluetooth driver over the host's default adapter.
pub struct BluetoothTransport {
    _session: Session,
    adapter: Adapter,
}

impl BluetoothTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let session = Session::new()
            .await
            .map_err(|e| TransportError::Unsupported(format!("bluez session: {e}")))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| TransportError::Unsupported(format!("bluetooth adapter: {e}")))?;
        adapter
            .set_powered(true)
            .await
            .map_err(|e| TransportError::Unsupported(format!("adapter power: {e}")))?;
        Ok(Self {
            _session: session,
            adapter,
        })
    }

    /// Run an inquiry for a bounded window and return every address seen,
    /// including devices the adapter already knew.
    async fn inquiry(&self) -> Result<HashSet<Address>, TransportError> {
        let mut seen: HashSet<Address> = self
            .adapter
            .device_addresses()
            .await
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?
            .into_iter()
            .collect();

        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;
        futures::pin_mut!(events);

        let deadline = tokio::time::Instant::now() + INQUIRY_WINDOW;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, events.next()).await {
                Ok(Some(AdapterEvent::DeviceAdded(addr))) => {
                    seen.insert(addr);
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        Ok(seen)
    }
}

#[async_trait]
impl BrickTransport for BluetoothTransport {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Bluetooth
    }

    async fn enumerate(&self) -> Result<Vec<Candidate>, TransportError> {
        let mut candidates = Vec::new();

        for addr in self.inquiry().await? {
            let device = match self.adapter.device(addr) {
                Ok(d) => d,
                Err(e) => {
                    warn!(%addr, error = %e, "skipping unreadable device");
                    continue;
                }
            };
            let class = match device.class().await {
                Ok(Some(c)) => c,
                _ => continue,
            };
            if class & 0x00FF_FFFF != DEVICE_CLASS {
                continue;
            }
            let name = device
                .name()
                .await
                .ok()
                .flatten()
                .or_else(|| Some(addr.to_string()));
            debug!(%addr, ?name, "bluetooth brick found");
            candidates.push(Candidate {
                id: BrickId::from(addr.0),
                kind: ConnectionKind::Bluetooth,
                name,
                addr: CandidateAddr::Bluetooth { addr: addr.0 },
            });
        }
        Ok(candidates)
    }

    async fn open(&self, candidate: &Candidate) -> Result<Box<dyn BrickLink>, TransportError> {
        let CandidateAddr::Bluetooth { addr } = candidate.addr else {
            return Err(TransportError::OpenFailed(
                "not a Bluetooth candidate".to_string(),
            ));
        };
        let target = SocketAddr::new(Address::new(addr), RFCOMM_CHANNEL);
        let stream = tokio::time::timeout(IO_TIMEOUT, Stream::connect(target))
            .await
            .map_err(|_| TransportError::Timeout("rfcomm connect".to_string()))?
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        debug!(id = %candidate.id, "RFCOMM link opened");
        Ok(Box::new(BluetoothLink { stream }))
    }
}

/// Open RFCOMM link to one brick, speaking the length-prefixed
/// mini-frame.
pub struct BluetoothLink {
    stream: Stream,
}

#[async_trait]
impl BrickLink for BluetoothLink {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut framed = Vec::with_capacity(2 + data.len());
        framed.extend_from_slice(&(data.len() as u16).to_le_bytes());
        framed.extend_from_slice(data);

        tokio::time::timeout(IO_TIMEOUT, self.stream.write_all(&framed))
            .await
            .map_err(|_| TransportError::Timeout("rfcomm write".to_string()))?
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(data.len())
    }

    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut body = tokio::time::timeout(IO_TIMEOUT, async {
            let mut prefix = [0u8; 2];
            self.stream.read_exact(&mut prefix).await?;
            let len = u16::from_le_bytes(prefix) as usize;
            let mut body = vec![0u8; len];
            self.stream.read_exact(&mut body).await?;
            Ok::<_, std::io::Error>(body)
        })
        .await
        .map_err(|_| TransportError::Timeout("rfcomm read".to_string()))?
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        // The whole mini-frame is consumed either way; callers asking for
        // less than one telegram only see the front of it.
        body.truncate(max_len);
        Ok(body)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
