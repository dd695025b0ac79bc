//! Gateway daemon core
//!
//! The gateway owns every open brick link on the machine and multiplexes
//! them to TCP clients. Three pieces cooperate around one shared
//! [`Registry`]:
//!
//! - the registry itself: a slot table mapping one-byte handles to
//!   discovered bricks and their open links,
//! - the discovery [`Scanner`]: a perpetual task that enumerates the
//!   enabled transports and registers anything new,
//! - the TCP [`Gateway`]: accepts sessions and serves the LIST / SEND /
//!   RECV commands against the registry.
//!
//! Transport I/O never runs under the registry lock; links are handed
//! out as `Arc<tokio::sync::Mutex<..>>` and locked per operation.

mod link;
mod registry;
mod scanner;
mod server;

pub use link::{probe, read_brick_name, LinkExchange};
pub use registry::{DeviceSnapshot, Registry, RegistryError, SharedLink, MAX_CAPACITY};
pub use scanner::Scanner;
pub use server::{Gateway, GatewayConfig, GatewayError};
