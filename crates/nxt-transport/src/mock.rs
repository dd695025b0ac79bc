//! Scripted mock transport for tests and demo mode
//!
//! A [`MockBus`] holds fake bricks that can be plugged, unplugged and
//! scripted with request/reply pairs. A [`MockTransport`] exposes one
//! connection kind's view of the bus through the normal driver traits, so
//! the scanner and gateway exercise exactly the code paths real hardware
//! would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::driver::{
    BrickId, BrickLink, BrickTransport, Candidate, CandidateAddr, ConnectionKind,
};
use crate::error::TransportError;

/// One fake brick on the mock bus.
pub struct MockBrick {
    id: BrickId,
    kind: ConnectionKind,
    name: String,
    connected: AtomicBool,
    /// Scripted request -> reply overrides, matched before the defaults.
    responses: RwLock<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl MockBrick {
    pub fn new(id: BrickId, kind: ConnectionKind, name: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            name: name.to_string(),
            connected: AtomicBool::new(true),
            responses: RwLock::new(Vec::new()),
        })
    }

    pub fn id(&self) -> BrickId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Script a reply for an exact or prefix request match.
    pub fn add_response(&self, request: Vec<u8>, reply: Vec<u8>) {
        self.responses.write().push((request, reply));
    }

    /// Simulate unplugging (or replugging) the brick. While disconnected
    /// every link call fails and enumeration skips it.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &[u8]) -> Option<Vec<u8>> {
        {
            let scripted = self.responses.read();
            for (req, reply) in scripted.iter() {
                if request == req.as_slice() || request.starts_with(req) {
                    return Some(reply.clone());
                }
            }
        }

        // No-reply telegram kinds get no reply queued.
        let (&kind, rest) = request.split_first()?;
        if kind & 0x80 != 0 {
            return None;
        }
        let &op = rest.first()?;

        Some(match (kind, op) {
            // keep-alive: sleep-timer limit in ms
            (0x00, 0x0D) => vec![0x02, 0x0D, 0x00, 0x60, 0xEA, 0x00, 0x00],
            // battery level: 9.0 V
            (0x00, 0x0B) => vec![0x02, 0x0B, 0x00, 0x28, 0x23],
            // firmware version
            (0x01, 0x88) => vec![0x02, 0x88, 0x00, 124, 1, 3, 1],
            // device info: name, address, signal, free flash
            (0x01, 0x9B) => {
                let mut reply = vec![0x02, 0x9B, 0x00];
                let mut name = [0u8; 15];
                let n = self.name.as_bytes().len().min(14);
                name[..n].copy_from_slice(&self.name.as_bytes()[..n]);
                reply.extend_from_slice(&name);
                reply.extend_from_slice(self.id.as_bytes());
                reply.push(0); // address padding byte
                reply.extend_from_slice(&0u32.to_le_bytes());
                reply.extend_from_slice(&64000u32.to_le_bytes());
                reply
            }
            // anything else: echoed opcode, UnknownCommand status
            _ => vec![0x02, op, 0xBE],
        })
    }
}

/// Shared collection of fake bricks.
#[derive(Clone, Default)]
pub struct MockBus {
    bricks: Arc<RwLock<Vec<Arc<MockBrick>>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&self, brick: Arc<MockBrick>) {
        self.bricks.write().push(brick);
    }

    pub fn brick(&self, id: BrickId) -> Option<Arc<MockBrick>> {
        self.bricks.read().iter().find(|b| b.id == id).cloned()
    }

    /// View of this bus for one connection kind.
    pub fn transport(&self, kind: ConnectionKind) -> MockTransport {
        MockTransport {
            bus: self.clone(),
            kind,
        }
    }
}

/// Driver-trait view of a [`MockBus`].
pub struct MockTransport {
    bus: MockBus,
    kind: ConnectionKind,
}

#[async_trait]
impl BrickTransport for MockTransport {
    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn enumerate(&self) -> Result<Vec<Candidate>, TransportError> {
        let bricks = self.bus.bricks.read();
        Ok(bricks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == self.kind && b.is_connected())
            .map(|(index, b)| Candidate {
                id: b.id,
                kind: b.kind,
                name: b.kind.is_bluetooth().then(|| b.name.clone()),
                addr: CandidateAddr::Mock { index },
            })
            .collect())
    }

    async fn open(&self, candidate: &Candidate) -> Result<Box<dyn BrickLink>, TransportError> {
        let brick = self
            .bus
            .brick(candidate.id)
            .ok_or(TransportError::NotFound)?;
        if !brick.is_connected() {
            return Err(TransportError::OpenFailed("brick unplugged".into()));
        }
        debug!(id = %brick.id(), name = brick.name(), "mock link opened");
        Ok(Box::new(MockLink {
            brick,
            pending: None,
        }))
    }
}

/// Open link to one mock brick.
pub struct MockLink {
    brick: Arc<MockBrick>,
    pending: Option<Vec<u8>>,
}

#[async_trait]
impl BrickLink for MockLink {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.brick.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.pending = self.brick.respond(data);
        Ok(data.len())
    }

    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.brick.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut reply = self
            .pending
            .take()
            .ok_or_else(|| TransportError::Timeout("no reply pending".into()))?;
        reply.truncate(max_len);
        Ok(reply)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.pending = None;
        Ok(())
    }
}
