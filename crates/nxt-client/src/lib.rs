//! Client-side session shim
//!
//! A [`GatewayClient`] speaks the LIST / SEND / RECV session protocol to
//! a gateway daemon over TCP. A [`RemoteBrick`] layers the telegram
//! protocol on top of one registered handle, so code written against
//! `nxt_proto::Exchange` works identically against local hardware and a
//! brick on the other side of a gateway.

mod error;
mod remote;
mod session;

pub use error::ClientError;
pub use remote::RemoteBrick;
pub use session::GatewayClient;
