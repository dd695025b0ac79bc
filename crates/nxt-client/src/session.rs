//! TCP session to a gateway daemon.

use nxt_wire::{
    decode_reply, encode_request, header_payload_len, BrickEntry, Password, Reply, Request,
    WireStatus, HEADER_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ClientError;

/// One authenticated session. Requests are strictly serialized; clone
/// nothing, open a second session for parallel work.
pub struct GatewayClient {
    stream: TcpStream,
    password: Password,
}

impl GatewayClient {
    /// Open a TCP session. The password is stamped into every request;
    /// the gateway checks it per packet, so a wrong one surfaces on the
    /// first call, not here.
    pub async fn connect(addr: impl ToSocketAddrs, password: Password) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = %stream.peer_addr()?, "gateway session opened");
        Ok(Self { stream, password })
    }

    /// Enumerate the bricks the gateway currently considers alive.
    pub async fn list(&mut self) -> Result<Vec<BrickEntry>, ClientError> {
        match self.round_trip(&Request::List).await? {
            Reply::List { bricks } => Ok(bricks),
            _ => Err(ClientError::MalformedReply(Request::List.command())),
        }
    }

    /// Forward one raw telegram to a brick; returns the bytes written.
    pub async fn send(&mut self, handle: u8, data: &[u8]) -> Result<u16, ClientError> {
        let request = Request::Send {
            handle,
            data: data.to_vec(),
        };
        match self.round_trip(&request).await? {
            Reply::Send { written } => Ok(written),
            _ => Err(ClientError::MalformedReply(request.command())),
        }
    }

    /// Read one telegram back from a brick, up to `max_len` bytes.
    pub async fn recv(&mut self, handle: u8, max_len: u16) -> Result<Vec<u8>, ClientError> {
        let request = Request::Recv { handle, max_len };
        match self.round_trip(&request).await? {
            Reply::Recv { data } => Ok(data),
            _ => Err(ClientError::MalformedReply(request.command())),
        }
    }

    async fn round_trip(&mut self, request: &Request) -> Result<Reply, ClientError> {
        let bytes = encode_request(request, &self.password)?;
        self.stream.write_all(&bytes).await?;

        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let payload_len = header_payload_len(&header)?;
        let mut packet = vec![0u8; HEADER_LEN + payload_len];
        packet[..HEADER_LEN].copy_from_slice(&header);
        self.stream.read_exact(&mut packet[HEADER_LEN..]).await?;

        let (command, status, reply) = decode_reply(&packet)?;
        if command != request.command() {
            return Err(ClientError::CommandMismatch {
                expected: request.command(),
                got: command,
            });
        }
        match status {
            WireStatus::Ok => Ok(reply),
            WireStatus::WrongPassword => Err(ClientError::WrongPassword),
            status => Err(ClientError::Rejected { command, status }),
        }
    }
}
