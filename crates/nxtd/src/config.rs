//! Daemon configuration: TOML file values overridden by CLI flags.

use std::time::Duration;

use nxt_gateway::MAX_CAPACITY;
use nxt_wire::{Password, DEFAULT_PORT};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NxtdConfig {
    pub server: ServerSection,
    pub discovery: DiscoverySection,
    pub transport: TransportSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: u16,
    pub password: String,
    pub local_only: bool,
    /// Registry slots; values above 256 are clamped, since a wire
    /// handle is one byte.
    pub capacity: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            password: String::new(),
            local_only: false,
            capacity: MAX_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySection {
    pub scan_interval_secs: u64,
    /// No idle eviction when absent.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            scan_interval_secs: 2,
            idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    pub usb: bool,
    pub bluetooth: bool,
    pub mock: bool,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            usb: true,
            bluetooth: true,
            mock: false,
        }
    }
}

/// Parsed command-line arguments. `None`/`false` means "not given";
/// flags always win over file values.
#[derive(Debug, Default)]
pub struct Args {
    pub config_path: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub local: bool,
    pub no_usb: bool,
    pub no_bt: bool,
    pub mock: bool,
    pub scan_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub log_file: Option<String>,
    pub pid_file: Option<String>,
}

/// Everything resolved, ready to hand to the gateway pieces.
#[derive(Debug)]
pub struct Settings {
    pub port: u16,
    pub password: Password,
    pub local_only: bool,
    pub capacity: usize,
    pub scan_interval: Duration,
    pub idle_timeout: Option<Duration>,
    pub usb: bool,
    pub bluetooth: bool,
    pub mock: bool,
    pub log_file: Option<String>,
    pub pid_file: Option<String>,
}

impl Settings {
    pub fn resolve(config: NxtdConfig, args: &Args) -> Self {
        let password = args
            .password
            .clone()
            .unwrap_or(config.server.password);
        Self {
            port: args.port.unwrap_or(config.server.port),
            password: Password::from(password.as_str()),
            local_only: args.local || config.server.local_only,
            capacity: config.server.capacity,
            scan_interval: Duration::from_secs(
                args.scan_interval_secs
                    .unwrap_or(config.discovery.scan_interval_secs),
            ),
            idle_timeout: args
                .idle_timeout_secs
                .or(config.discovery.idle_timeout_secs)
                .map(Duration::from_secs),
            usb: config.transport.usb && !args.no_usb,
            bluetooth: config.transport.bluetooth && !args.no_bt,
            mock: args.mock || config.transport.mock,
            log_file: args.log_file.clone(),
            pid_file: args.pid_file.clone(),
        }
    }
}
