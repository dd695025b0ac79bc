//! Handle-addressed slot table of discovered bricks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nxt_transport::{BrickId, BrickLink, Candidate, ConnectionKind};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Handles are one wire byte, so the table can never exceed this.
pub const MAX_CAPACITY: usize = 256;

/// An open link, lockable per operation so transport I/O happens outside
/// the registry lock.
pub type SharedLink = Arc<tokio::sync::Mutex<Box<dyn BrickLink>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry full ({0} slots)")]
    Full(usize),
}

struct DeviceRecord {
    name: String,
    id: BrickId,
    kind: ConnectionKind,
    candidate: Candidate,
    link: Option<SharedLink>,
    idle_deadline: Option<Instant>,
}

/// Point-in-time view of one slot, safe to use without the lock. The
/// link is a clone of the shared handle, not a copy of the connection.
#[derive(Clone)]
pub struct DeviceSnapshot {
    pub handle: u8,
    pub name: String,
    pub id: BrickId,
    pub kind: ConnectionKind,
    pub candidate: Candidate,
    pub link: Option<SharedLink>,
    pub idle_deadline: Option<Instant>,
}

impl DeviceSnapshot {
    pub fn idle_expired(&self, now: Instant) -> bool {
        self.idle_deadline.is_some_and(|d| d <= now)
    }
}

/// The gateway's table of known bricks.
///
/// At most one record exists per `(id, kind)`; a brick reachable over
/// both USB and Bluetooth legitimately occupies two slots. Handles are
/// the lowest free slot index and stay stable until eviction.
pub struct Registry {
    slots: Mutex<Vec<Option<DeviceRecord>>>,
    idle_timeout: Option<Duration>,
}

impl Registry {
    pub fn new(capacity: usize, idle_timeout: Option<Duration>) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(slots),
            idle_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    fn fresh_deadline(&self) -> Option<Instant> {
        self.idle_timeout.map(|t| Instant::now() + t)
    }

    /// Insert a discovered brick, returning its handle. Registering a
    /// device that is already present returns the existing handle and
    /// leaves the record untouched.
    pub fn register(
        &self,
        candidate: Candidate,
        name: String,
        link: Option<SharedLink>,
    ) -> Result<u8, RegistryError> {
        let mut slots = self.slots.lock();

        for (index, slot) in slots.iter().enumerate() {
            if let Some(record) = slot {
                if record.id == candidate.id && record.kind == candidate.kind {
                    return Ok(index as u8);
                }
            }
        }

        let free = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(RegistryError::Full(slots.len()))?;

        info!(
            handle = free,
            name = %name,
            id = %candidate.id,
            kind = %candidate.kind,
            "brick registered"
        );
        slots[free] = Some(DeviceRecord {
            name,
            id: candidate.id,
            kind: candidate.kind,
            candidate,
            link,
            idle_deadline: self.fresh_deadline(),
        });
        Ok(free as u8)
    }

    pub fn lookup(&self, handle: u8) -> Option<DeviceSnapshot> {
        let slots = self.slots.lock();
        slots
            .get(handle as usize)?
            .as_ref()
            .map(|r| snapshot_of(handle, r))
    }

    pub fn contains(&self, id: BrickId, kind: ConnectionKind) -> Option<u8> {
        let slots = self.slots.lock();
        slots.iter().enumerate().find_map(|(index, slot)| {
            slot.as_ref()
                .filter(|r| r.id == id && r.kind == kind)
                .map(|_| index as u8)
        })
    }

    /// Free a slot, returning the link (if any) for the caller to close
    /// outside the lock.
    pub fn evict(&self, handle: u8) -> Option<SharedLink> {
        let mut slots = self.slots.lock();
        let record = slots.get_mut(handle as usize)?.take()?;
        debug!(handle, id = %record.id, "brick evicted");
        record.link
    }

    /// Refresh the idle deadline after serving an operation.
    pub fn touch(&self, handle: u8) {
        let deadline = self.fresh_deadline();
        let mut slots = self.slots.lock();
        if let Some(Some(record)) = slots.get_mut(handle as usize) {
            record.idle_deadline = deadline;
        }
    }

    /// Attach a freshly opened link to a record that had none (or whose
    /// previous link was dropped).
    pub fn attach_link(&self, handle: u8, link: SharedLink) {
        let mut slots = self.slots.lock();
        if let Some(Some(record)) = slots.get_mut(handle as usize) {
            record.link = Some(link);
        }
    }

    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let slots = self.slots.lock();
        slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|r| snapshot_of(index as u8, r)))
            .collect()
    }

    /// Evict everything, returning the open links for shutdown cleanup.
    pub fn drain(&self) -> Vec<SharedLink> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .filter_map(|slot| slot.take().and_then(|r| r.link))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn snapshot_of(handle: u8, record: &DeviceRecord) -> DeviceSnapshot {
    DeviceSnapshot {
        handle,
        name: record.name.clone(),
        id: record.id,
        kind: record.kind,
        candidate: record.candidate.clone(),
        link: record.link.clone(),
        idle_deadline: record.idle_deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxt_transport::CandidateAddr;

    fn candidate(id: BrickId, kind: ConnectionKind) -> Candidate {
        Candidate {
            id,
            kind,
            name: None,
            addr: CandidateAddr::Mock { index: 0 },
        }
    }

    fn usb(bus: u8, address: u8) -> Candidate {
        candidate(BrickId::from_usb(bus, address), ConnectionKind::Usb)
    }

    #[test]
    fn assigns_lowest_free_slot() {
        let registry = Registry::new(4, None);
        assert_eq!(registry.register(usb(1, 1), "a".into(), None), Ok(0));
        assert_eq!(registry.register(usb(1, 2), "b".into(), None), Ok(1));
        assert_eq!(registry.register(usb(1, 3), "c".into(), None), Ok(2));

        registry.evict(1);
        assert_eq!(registry.register(usb(1, 4), "d".into(), None), Ok(1));
        // surviving handles were not disturbed
        assert_eq!(registry.lookup(0).unwrap().name, "a");
        assert_eq!(registry.lookup(2).unwrap().name, "c");
    }

    #[test]
    fn duplicate_registration_returns_existing_handle() {
        let registry = Registry::new(4, None);
        let h = registry.register(usb(1, 1), "first".into(), None).unwrap();
        let again = registry
            .register(usb(1, 1), "renamed".into(), None)
            .unwrap();
        assert_eq!(h, again);
        assert_eq!(registry.lookup(h).unwrap().name, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_id_different_kind_is_a_separate_record() {
        let registry = Registry::new(4, None);
        let id = BrickId([0, 0x16, 0x53, 1, 2, 3]);
        let h1 = registry
            .register(candidate(id, ConnectionKind::Usb), "nxt".into(), None)
            .unwrap();
        let h2 = registry
            .register(candidate(id, ConnectionKind::Bluetooth), "nxt".into(), None)
            .unwrap();
        assert_ne!(h1, h2);
        assert_eq!(registry.contains(id, ConnectionKind::Usb), Some(h1));
        assert_eq!(registry.contains(id, ConnectionKind::Bluetooth), Some(h2));
    }

    #[test]
    fn full_table_refuses_registration() {
        let registry = Registry::new(2, None);
        registry.register(usb(1, 1), "a".into(), None).unwrap();
        registry.register(usb(1, 2), "b".into(), None).unwrap();
        assert_eq!(
            registry.register(usb(1, 3), "c".into(), None),
            Err(RegistryError::Full(2))
        );
    }

    #[test]
    fn capacity_is_clamped_to_the_handle_space() {
        let registry = Registry::new(10_000, None);
        assert_eq!(registry.capacity(), MAX_CAPACITY);
    }

    #[test]
    fn touch_pushes_the_idle_deadline() {
        let registry = Registry::new(4, Some(Duration::from_secs(60)));
        let h = registry.register(usb(1, 1), "a".into(), None).unwrap();

        let before = registry.lookup(h).unwrap().idle_deadline.unwrap();
        registry.touch(h);
        let after = registry.lookup(h).unwrap().idle_deadline.unwrap();
        assert!(after >= before);
        assert!(!registry.lookup(h).unwrap().idle_expired(Instant::now()));
    }

    #[test]
    fn no_idle_timeout_means_no_deadline() {
        let registry = Registry::new(4, None);
        let h = registry.register(usb(1, 1), "a".into(), None).unwrap();
        assert!(registry.lookup(h).unwrap().idle_deadline.is_none());
        assert!(!registry.lookup(h).unwrap().idle_expired(Instant::now()));
    }

    #[test]
    fn drain_empties_the_table() {
        let registry = Registry::new(4, None);
        registry.register(usb(1, 1), "a".into(), None).unwrap();
        registry.register(usb(1, 2), "b".into(), None).unwrap();
        registry.drain();
        assert!(registry.is_empty());
        assert!(registry.lookup(0).is_none());
    }
}
