//! Perpetual discovery scanner.
//!
//! One background task sweeps every enabled transport, opens anything
//! new it finds and registers it with the link attached. Failures are
//! per-candidate: a brick that vanishes between enumeration and open is
//! logged and skipped, never fatal.

use std::sync::Arc;
use std::time::Duration;

use nxt_transport::{BrickTransport, Candidate, TransportSet};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::link::read_brick_name;
use crate::registry::Registry;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

pub struct Scanner {
    registry: Arc<Registry>,
    transports: TransportSet,
    interval: Duration,
}

impl Scanner {
    pub fn new(registry: Arc<Registry>, transports: TransportSet, interval: Duration) -> Self {
        Self {
            registry,
            transports,
            interval,
        }
    }

    /// Start the sweep loop. The task runs until the daemon aborts it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.sweep().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }

    /// One pass over every transport.
    pub async fn sweep(&self) {
        for transport in self.transports.iter() {
            let candidates = match transport.enumerate().await {
                Ok(c) => c,
                Err(e) => {
                    warn!(kind = %transport.kind(), error = %e, "enumeration failed, skipping transport");
                    continue;
                }
            };
            for candidate in candidates {
                if self
                    .registry
                    .contains(candidate.id, candidate.kind)
                    .is_some()
                {
                    continue;
                }
                if let Err(e) = self.adopt(transport.as_ref(), candidate.clone()).await {
                    warn!(id = %candidate.id, kind = %candidate.kind, error = %e, "skipping brick");
                }
            }
        }
    }

    /// Open a link to a newly seen candidate, resolve its name and
    /// register it.
    async fn adopt(
        &self,
        transport: &dyn BrickTransport,
        candidate: Candidate,
    ) -> Result<(), AdoptError> {
        let mut link = transport.open(&candidate).await?;

        // Bluetooth inquiry already knows the name; USB has to ask the
        // brick itself.
        let name = match candidate.name.clone() {
            Some(name) => name,
            None => read_brick_name(link.as_mut()).await?,
        };

        let shared = Arc::new(tokio::sync::Mutex::new(link));
        let handle = self.registry.register(candidate, name.clone(), Some(shared))?;
        debug!(handle, name = %name, "brick adopted");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum AdoptError {
    #[error(transparent)]
    Transport(#[from] nxt_transport::TransportError),
    #[error(transparent)]
    Proto(#[from] nxt_proto::ProtoError),
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}
