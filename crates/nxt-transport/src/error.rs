//! Transport layer errors
//!
//! Any of these means "device gone" to the gateway: the record is evicted
//! and the brick may reappear on a later discovery sweep.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("device not found")]
    NotFound,

    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("transport not supported: {0}")]
    Unsupported(String),
}
