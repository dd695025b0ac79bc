use nxt_proto::ProtoError;
use nxt_wire::{Command, WireCodecError, WireStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire protocol violation: {0}")]
    Codec(#[from] WireCodecError),

    #[error("telegram error: {0}")]
    Proto(#[from] ProtoError),

    #[error("gateway rejected the password")]
    WrongPassword,

    #[error("gateway refused {command}: {status}")]
    Rejected {
        command: Command,
        status: WireStatus,
    },

    #[error("reply echoes {got}, expected {expected}")]
    CommandMismatch { expected: Command, got: Command },

    #[error("reply body does not match {0}")]
    MalformedReply(Command),
}
