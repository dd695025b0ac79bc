//! nxtd - Brick Gateway Daemon
//!
//! Owns every local brick connection (USB and Bluetooth) and serves the
//! LIST / SEND / RECV session protocol over TCP, so any number of client
//! programs can reach the bricks without fighting over the hardware.
//!
//! Usage:
//!   nxtd [OPTIONS] [config.toml]
//!
//! If no config file is provided, defaults apply: all built transports
//! enabled, port 13370, empty password.

mod config;

use std::sync::Arc;

use nxt_gateway::{Gateway, GatewayConfig, Registry, Scanner};
use nxt_transport::TransportSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, NxtdConfig, Settings};

fn parse_args() -> anyhow::Result<Args> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let mut args = Args::default();

    let mut i = 0;
    while i < raw.len() {
        let take_value = |i: usize| -> anyhow::Result<&str> {
            raw.get(i + 1)
                .map(|s| s.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing value for {}", raw[i]))
        };
        match raw[i].as_str() {
            "--port" => {
                args.port = Some(take_value(i)?.parse()?);
                i += 2;
            }
            "--password" => {
                args.password = Some(take_value(i)?.to_string());
                i += 2;
            }
            "--local" => {
                args.local = true;
                i += 1;
            }
            "--no-usb" => {
                args.no_usb = true;
                i += 1;
            }
            "--no-bt" => {
                args.no_bt = true;
                i += 1;
            }
            "--mock" => {
                args.mock = true;
                i += 1;
            }
            "--scan-interval" => {
                args.scan_interval_secs = Some(take_value(i)?.parse()?);
                i += 2;
            }
            "--idle-timeout" => {
                args.idle_timeout_secs = Some(take_value(i)?.parse()?);
                i += 2;
            }
            "--log-file" => {
                args.log_file = Some(take_value(i)?.to_string());
                i += 2;
            }
            "--pid-file" => {
                args.pid_file = Some(take_value(i)?.to_string());
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                args.config_path = Some(arg.to_string());
                i += 1;
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(args)
}

fn print_help() {
    eprintln!(
        r#"nxtd - Brick Gateway Daemon

Usage: nxtd [OPTIONS] [config.toml]

Options:
  --port <n>            TCP port to listen on (default 13370)
  --password <s>        Session password (default empty)
  --local               Accept loopback sessions only
  --no-usb              Disable the USB transport
  --no-bt               Disable the Bluetooth transport
  --mock                Use a scripted in-process brick instead of hardware
  --scan-interval <s>   Seconds between discovery sweeps (default 2)
  --idle-timeout <s>    Evict bricks idle longer than this (default: never)
  --log-file <path>     Also write logs to a file
  --pid-file <path>     Write the daemon pid to a file
  -h, --help            Print this help message

Flags override values from the config file.

Examples:
  # Run with defaults
  nxtd

  # Loopback only, with a password
  nxtd --local --password hunter2

  # Demo mode without hardware
  nxtd --mock
"#
    );
}

fn init_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nxtd=info,nxt_gateway=info,nxt_transport=info".into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn build_transports(settings: &Settings) -> TransportSet {
    let mut transports = TransportSet::new();

    if settings.mock {
        // Demo mode: one fake brick, no hardware access at all.
        let bus = nxt_transport::mock::MockBus::new();
        bus.plug(nxt_transport::mock::MockBrick::new(
            nxt_transport::BrickId::from_usb(0, 1),
            nxt_transport::ConnectionKind::Usb,
            "NXT",
        ));
        transports.push(Arc::new(bus.transport(nxt_transport::ConnectionKind::Usb)));
        return transports;
    }

    #[cfg(feature = "usb")]
    if settings.usb {
        match nxt_transport::usb::UsbTransport::new() {
            Ok(t) => transports.push(Arc::new(t)),
            Err(e) => tracing::warn!(error = %e, "USB transport unavailable"),
        }
    }
    #[cfg(not(feature = "usb"))]
    if settings.usb {
        tracing::warn!("USB support not built into this binary");
    }

    #[cfg(all(target_os = "linux", feature = "bluetooth"))]
    if settings.bluetooth {
        match nxt_transport::bluetooth::BluetoothTransport::new().await {
            Ok(t) => transports.push(Arc::new(t)),
            Err(e) => tracing::warn!(error = %e, "Bluetooth transport unavailable"),
        }
    }
    #[cfg(not(all(target_os = "linux", feature = "bluetooth")))]
    if settings.bluetooth {
        tracing::debug!("Bluetooth support not built into this binary");
    }

    transports
}

/// Resolves when the process is told to stop: SIGINT (ctrl-c) or, on
/// unix, SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let file_config = match &args.config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<NxtdConfig>(&content)?
        }
        None => NxtdConfig::default(),
    };
    let settings = Settings::resolve(file_config, &args);

    init_logging(settings.log_file.as_deref())?;
    tracing::info!(port = settings.port, "starting nxtd");

    if let Some(path) = &settings.pid_file {
        std::fs::write(path, format!("{}\n", std::process::id()))?;
    }

    let transports = build_transports(&settings).await;
    if transports.is_empty() {
        tracing::warn!("no transports enabled; the registry will stay empty");
    }

    let registry = Arc::new(Registry::new(settings.capacity, settings.idle_timeout));
    let scanner_task = Scanner::new(
        Arc::clone(&registry),
        transports.clone(),
        settings.scan_interval,
    )
    .spawn();

    let gateway_config = GatewayConfig {
        port: settings.port,
        password: settings.password,
        local_only: settings.local_only,
        idle_timeout: settings.idle_timeout,
        capacity: settings.capacity,
        ..GatewayConfig::default()
    };
    let gateway = Gateway::new(gateway_config, Arc::clone(&registry), transports);
    let listener = gateway.bind().await?;

    tokio::select! {
        result = Arc::clone(&gateway).serve(listener) => {
            result?;
        }
        result = shutdown_signal() => {
            result?;
            tracing::info!("shutdown signal received");
        }
    }

    scanner_task.abort();
    gateway.shutdown().await;
    if let Some(path) = &settings.pid_file {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path, error = %e, "failed to remove pid file");
        }
    }
    tracing::info!("nxtd stopped");
    Ok(())
}
