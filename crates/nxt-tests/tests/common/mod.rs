//! Shared in-process test harness: mock bus + live gateway on an
//! ephemeral loopback port.

// Not every test file uses every helper.
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use nxt_gateway::{Gateway, GatewayConfig, Registry, Scanner};
use nxt_transport::mock::{MockBrick, MockBus};
use nxt_transport::{BrickId, ConnectionKind, TransportSet};

pub struct Harness {
    pub bus: MockBus,
    pub gateway: Arc<Gateway>,
    pub scanner: Scanner,
    pub addr: SocketAddr,
}

impl Harness {
    pub async fn start(password: &str) -> Self {
        Self::start_with(password, None).await
    }

    pub async fn start_with(password: &str, idle_timeout: Option<Duration>) -> Self {
        let bus = MockBus::new();
        let mut transports = TransportSet::new();
        transports.push(Arc::new(bus.transport(ConnectionKind::Usb)));
        transports.push(Arc::new(bus.transport(ConnectionKind::Bluetooth)));

        let registry = Arc::new(Registry::new(16, idle_timeout));
        let scanner = Scanner::new(
            Arc::clone(&registry),
            transports.clone(),
            Duration::from_secs(2),
        );

        let config = GatewayConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            password: password.into(),
            idle_timeout,
            ..GatewayConfig::default()
        };
        let gateway = Gateway::new(config, registry, transports);
        let listener = gateway.bind().await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(Arc::clone(&gateway).serve(listener));

        Self {
            bus,
            gateway,
            scanner,
            addr,
        }
    }

    /// Plug a USB brick into the mock bus. It stays undiscovered until
    /// the next `sweep()`.
    pub fn plug_usb(&self, name: &str, address: u8) -> Arc<MockBrick> {
        let brick = MockBrick::new(BrickId::from_usb(1, address), ConnectionKind::Usb, name);
        self.bus.plug(brick.clone());
        brick
    }

    pub fn plug_bluetooth(&self, name: &str, last: u8) -> Arc<MockBrick> {
        let brick = MockBrick::new(
            BrickId([0x00, 0x16, 0x53, 0x00, 0x00, last]),
            ConnectionKind::Bluetooth,
            name,
        );
        self.bus.plug(brick.clone());
        brick
    }

    /// One discovery pass, as the background task would run it.
    pub async fn sweep(&self) {
        self.scanner.sweep().await;
    }
}
