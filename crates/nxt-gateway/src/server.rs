//! TCP session server: LIST / SEND / RECV against the registry.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nxt_transport::TransportSet;
use nxt_wire::{
    decode_request, encode_raw_reply, encode_reply, header_password, header_payload_len,
    BrickEntry, Password, Reply, Request, WireCodecError, WireStatus, DEFAULT_PORT, HEADER_LEN,
    NAME_LEN,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

use crate::link::probe;
use crate::registry::{DeviceSnapshot, Registry, SharedLink};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub password: Password,
    /// Reject sessions from non-loopback peers before reading anything.
    pub local_only: bool,
    /// Best-effort idle eviction; expired records go during the next
    /// LIST sweep.
    pub idle_timeout: Option<Duration>,
    pub capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            password: Password::empty(),
            local_only: false,
            idle_timeout: None,
            capacity: crate::registry::MAX_CAPACITY,
        }
    }
}

/// The session server. Shares its [`Registry`] with the discovery
/// scanner; the transports are only touched for open-on-demand.
pub struct Gateway {
    registry: Arc<Registry>,
    transports: TransportSet,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<Registry>,
        transports: TransportSet,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transports,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "gateway listening");
        Ok(listener)
    }

    /// Accept loop. Each session runs in its own task; a misbehaving
    /// client only ever takes down its own connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), GatewayError> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                gateway.handle_connection(stream, peer).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        if !peer_permitted(self.config.local_only, peer.ip()) {
            info!(%peer, "rejecting non-local session");
            return;
        }
        debug!(%peer, "session opened");

        loop {
            let mut header = [0u8; HEADER_LEN];
            if stream.read_exact(&mut header).await.is_err() {
                // EOF or reset; the normal end of a session.
                debug!(%peer, "session closed");
                return;
            }
            let payload_len = match header_payload_len(&header) {
                Ok(n) => n,
                Err(e) => {
                    warn!(%peer, error = %e, "closing session on invalid header");
                    return;
                }
            };
            let mut packet = vec![0u8; HEADER_LEN + payload_len];
            packet[..HEADER_LEN].copy_from_slice(&header);
            if stream.read_exact(&mut packet[HEADER_LEN..]).await.is_err() {
                warn!(%peer, "session dropped mid-packet");
                return;
            }

            // The password gate comes first; even an unrecognized
            // command byte is not inspected for an unauthenticated peer.
            let reply_bytes = if header_password(&header) != self.config.password {
                warn!(%peer, "wrong password");
                Ok(encode_raw_reply(header[4], WireStatus::WrongPassword))
            } else {
                match decode_request(&packet) {
                    Ok((request, _)) => {
                        let (status, reply) = self.handle_request(&request).await;
                        encode_reply(request.command(), status, &reply)
                    }
                    Err(WireCodecError::UnknownCommand(byte)) => {
                        debug!(%peer, byte, "unknown command");
                        Ok(encode_raw_reply(byte, WireStatus::UnknownCommand))
                    }
                    Err(e) => {
                        warn!(%peer, error = %e, "closing session on malformed packet");
                        return;
                    }
                }
            };

            let reply_bytes = match reply_bytes {
                Ok(b) => b,
                Err(e) => {
                    // A reply that cannot be encoded is a server bug, but
                    // it must not take the daemon down.
                    warn!(%peer, error = %e, "failed to encode reply");
                    return;
                }
            };
            if stream.write_all(&reply_bytes).await.is_err() {
                debug!(%peer, "session closed during write");
                return;
            }
        }
    }

    async fn handle_request(&self, request: &Request) -> (WireStatus, Reply) {
        match request {
            Request::List => self.op_list().await,
            Request::Send { handle, data } => self.op_send(*handle, data).await,
            Request::Recv { handle, max_len } => self.op_recv(*handle, *max_len).await,
        }
    }

    /// Sweep the registry, evicting idle-expired and dead entries, and
    /// report the survivors.
    async fn op_list(&self) -> (WireStatus, Reply) {
        let now = Instant::now();
        let mut bricks = Vec::new();

        for snap in self.registry.snapshot() {
            if snap.idle_expired(now) {
                debug!(handle = snap.handle, "evicting idle brick");
                self.evict_and_close(snap.handle).await;
                continue;
            }
            // Only open links are probed; an unopened record costs
            // nothing and gets its liveness checked on first use.
            if let Some(link) = &snap.link {
                let mut guard = link.lock().await;
                let alive = probe(guard.as_mut()).await.is_ok();
                drop(guard);
                if !alive {
                    info!(handle = snap.handle, id = %snap.id, "brick lost, evicting");
                    self.evict_and_close(snap.handle).await;
                    continue;
                }
            }
            bricks.push(BrickEntry {
                handle: snap.handle,
                is_bt: snap.kind.is_bluetooth(),
                id: *snap.id.as_bytes(),
                name: padded_name(&snap.name),
            });
        }
        (WireStatus::Ok, Reply::List { bricks })
    }

    async fn op_send(&self, handle: u8, data: &[u8]) -> (WireStatus, Reply) {
        let Some(snap) = self.registry.lookup(handle) else {
            return (WireStatus::NoSuchHandle, Reply::Empty);
        };
        let Some(link) = self.ensure_link(&snap).await else {
            self.evict_and_close(handle).await;
            return (WireStatus::Transport, Reply::Empty);
        };

        trace!(handle, data = %hex::encode(data), "telegram out");
        let sent = link.lock().await.send(data).await;
        match sent {
            Ok(written) => {
                self.registry.touch(handle);
                (
                    WireStatus::Ok,
                    Reply::Send {
                        written: written as u16,
                    },
                )
            }
            Err(e) => {
                info!(handle, error = %e, "send failed, evicting brick");
                self.evict_and_close(handle).await;
                (WireStatus::Transport, Reply::Empty)
            }
        }
    }

    async fn op_recv(&self, handle: u8, max_len: u16) -> (WireStatus, Reply) {
        let Some(snap) = self.registry.lookup(handle) else {
            return (WireStatus::NoSuchHandle, Reply::Empty);
        };
        let Some(link) = self.ensure_link(&snap).await else {
            self.evict_and_close(handle).await;
            return (WireStatus::Transport, Reply::Empty);
        };

        let received = link.lock().await.recv(max_len as usize).await;
        match received {
            Ok(data) => {
                trace!(handle, data = %hex::encode(&data), "telegram in");
                self.registry.touch(handle);
                (WireStatus::Ok, Reply::Recv { data })
            }
            Err(e) => {
                info!(handle, error = %e, "recv failed, evicting brick");
                self.evict_and_close(handle).await;
                (WireStatus::Transport, Reply::Empty)
            }
        }
    }

    /// Existing link, or one opened on demand through the record's own
    /// transport.
    async fn ensure_link(&self, snap: &DeviceSnapshot) -> Option<SharedLink> {
        if let Some(link) = &snap.link {
            return Some(link.clone());
        }
        let transport = self.transports.for_kind(snap.kind)?;
        match transport.open(&snap.candidate).await {
            Ok(link) => {
                let shared = Arc::new(tokio::sync::Mutex::new(link));
                self.registry.attach_link(snap.handle, shared.clone());
                Some(shared)
            }
            Err(e) => {
                warn!(handle = snap.handle, error = %e, "reopen failed");
                None
            }
        }
    }

    async fn evict_and_close(&self, handle: u8) {
        if let Some(link) = self.registry.evict(handle) {
            // Close failures are moot; the device is gone either way.
            let _ = link.lock().await.close().await;
        }
    }

    /// Close every open link. Called by the daemon on shutdown.
    pub async fn shutdown(&self) {
        for link in self.registry.drain() {
            let _ = link.lock().await.close().await;
        }
    }
}

/// Admission check for local-only mode, applied before any byte of the
/// session is read.
fn peer_permitted(local_only: bool, peer: IpAddr) -> bool {
    !local_only || peer.is_loopback()
}

fn padded_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let raw = name.as_bytes();
    let take = raw.len().min(NAME_LEN - 1);
    field[..take].copy_from_slice(&raw[..take]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use nxt_transport::mock::{MockBrick, MockBus};
    use nxt_transport::{BrickId, BrickTransport, ConnectionKind};

    struct Fixture {
        bus: MockBus,
        gateway: Arc<Gateway>,
    }

    impl Fixture {
        fn new(config: GatewayConfig) -> Self {
            let bus = MockBus::new();
            let mut transports = TransportSet::new();
            transports.push(Arc::new(bus.transport(ConnectionKind::Usb)));
            let registry = Arc::new(Registry::new(config.capacity, config.idle_timeout));
            let gateway = Gateway::new(config, registry, transports);
            Self { bus, gateway }
        }

        async fn plug_and_adopt(&self, name: &str, address: u8) -> u8 {
            let brick = MockBrick::new(
                BrickId::from_usb(1, address),
                ConnectionKind::Usb,
                name,
            );
            self.bus.plug(brick);
            let transport = self.bus.transport(ConnectionKind::Usb);
            // adopt the last-plugged candidate
            let cand = transport
                .enumerate()
                .await
                .unwrap()
                .into_iter()
                .last()
                .unwrap();
            let link = transport.open(&cand).await.unwrap();
            self.gateway
                .registry
                .register(
                    cand,
                    name.to_string(),
                    Some(Arc::new(tokio::sync::Mutex::new(link))),
                )
                .unwrap()
        }
    }

    #[tokio::test]
    async fn list_reports_live_bricks() {
        let fx = Fixture::new(GatewayConfig::default());
        let handle = fx.plug_and_adopt("NXT", 4).await;

        let (status, reply) = fx.gateway.handle_request(&Request::List).await;
        assert_eq!(status, WireStatus::Ok);
        let Reply::List { bricks } = reply else {
            panic!("expected LIST reply");
        };
        assert_eq!(bricks.len(), 1);
        assert_eq!(bricks[0].handle, handle);
        assert!(!bricks[0].is_bt);
        assert_eq!(bricks[0].name_str(), "NXT");
    }

    #[tokio::test]
    async fn list_evicts_dead_bricks() {
        let fx = Fixture::new(GatewayConfig::default());
        fx.plug_and_adopt("NXT", 4).await;
        fx.bus
            .brick(BrickId::from_usb(1, 4))
            .unwrap()
            .set_connected(false);

        let (status, reply) = fx.gateway.handle_request(&Request::List).await;
        assert_eq!(status, WireStatus::Ok);
        assert_eq!(reply, Reply::List { bricks: vec![] });
        assert!(fx.gateway.registry.is_empty());
    }

    #[tokio::test]
    async fn send_writes_and_reports_the_count() {
        let fx = Fixture::new(GatewayConfig::default());
        let handle = fx.plug_and_adopt("NXT", 4).await;

        let (status, reply) = fx
            .gateway
            .handle_request(&Request::Send {
                handle,
                data: vec![0x00, 0x0D],
            })
            .await;
        assert_eq!(status, WireStatus::Ok);
        assert_eq!(reply, Reply::Send { written: 2 });
    }

    #[tokio::test]
    async fn send_to_unknown_handle_fails_cleanly() {
        let fx = Fixture::new(GatewayConfig::default());
        let (status, reply) = fx
            .gateway
            .handle_request(&Request::Send {
                handle: 42,
                data: vec![0x00, 0x0D],
            })
            .await;
        assert_eq!(status, WireStatus::NoSuchHandle);
        assert_eq!(reply, Reply::Empty);
    }

    #[tokio::test]
    async fn transport_failure_evicts_and_reports() {
        let fx = Fixture::new(GatewayConfig::default());
        let handle = fx.plug_and_adopt("NXT", 4).await;
        fx.bus
            .brick(BrickId::from_usb(1, 4))
            .unwrap()
            .set_connected(false);

        let (status, _) = fx
            .gateway
            .handle_request(&Request::Send {
                handle,
                data: vec![0x00, 0x0D],
            })
            .await;
        assert_eq!(status, WireStatus::Transport);
        assert!(fx.gateway.registry.lookup(handle).is_none());
    }

    #[tokio::test]
    async fn send_then_recv_round_trips_a_telegram() {
        let fx = Fixture::new(GatewayConfig::default());
        let handle = fx.plug_and_adopt("NXT", 4).await;

        fx.gateway
            .handle_request(&Request::Send {
                handle,
                data: vec![0x00, 0x0D],
            })
            .await;
        let (status, reply) = fx
            .gateway
            .handle_request(&Request::Recv {
                handle,
                max_len: 64,
            })
            .await;
        assert_eq!(status, WireStatus::Ok);
        let Reply::Recv { data } = reply else {
            panic!("expected RECV reply");
        };
        assert_eq!(&data[..3], &[0x02, 0x0D, 0x00]);
    }

    #[test]
    fn local_only_admits_loopback_peers_only() {
        use std::net::Ipv6Addr;
        assert!(peer_permitted(true, IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(peer_permitted(true, IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!peer_permitted(
            true,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))
        ));
        // open mode admits anyone
        assert!(peer_permitted(
            false,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))
        ));
    }

    #[tokio::test]
    async fn name_field_is_nul_padded() {
        assert_eq!(&padded_name("NXT")[..4], &[b'N', b'X', b'T', 0]);
        // overlong names keep the terminating NUL
        let long = padded_name("a-name-well-beyond-the-field");
        assert_eq!(long[NAME_LEN - 1], 0);
    }
}
