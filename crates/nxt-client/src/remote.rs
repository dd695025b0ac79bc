//! Telegram-level view of one brick behind a gateway.

use async_trait::async_trait;
use nxt_proto::commands::{
    self, DeviceInfo, FirmwareVersion,
};
use nxt_proto::{parse_reply, BrickStatus, CommandFrame, Exchange, ProtoError, Reply, MAX_TELEGRAM};
use tracing::trace;

use crate::error::ClientError;
use crate::session::GatewayClient;

/// One registered brick, addressed through an open session.
///
/// Implements [`Exchange`], so the chunked bus helpers in
/// `nxt_proto::bus` (and anything else written against that trait) run
/// unchanged over the gateway.
pub struct RemoteBrick<'a> {
    client: &'a mut GatewayClient,
    handle: u8,
}

impl<'a> RemoteBrick<'a> {
    pub fn new(client: &'a mut GatewayClient, handle: u8) -> Self {
        Self { client, handle }
    }

    pub fn handle(&self) -> u8 {
        self.handle
    }

    /// One full telegram round trip: SEND, and RECV when the telegram
    /// kind expects an answer.
    pub async fn exchange(&mut self, frame: &CommandFrame) -> Result<Reply, ClientError> {
        trace!(handle = self.handle, opcode = frame.opcode(), "telegram out");
        self.client.send(self.handle, &frame.to_bytes()).await?;
        if !frame.wants_reply() {
            return Ok(Reply {
                opcode: frame.opcode(),
                status: BrickStatus::Success,
                payload: Vec::new(),
            });
        }
        let raw = self.client.recv(self.handle, MAX_TELEGRAM as u16).await?;
        Ok(parse_reply(frame, &raw)?)
    }

    pub async fn keep_alive(&mut self) -> Result<(), ClientError> {
        self.exchange(&commands::keep_alive()).await.map(|_| ())
    }

    /// Battery voltage in millivolts.
    pub async fn battery_level(&mut self) -> Result<u16, ClientError> {
        let reply = self.exchange(&commands::get_battery_level()).await?;
        Ok(commands::parse_battery_level(&reply)?)
    }

    pub async fn device_info(&mut self) -> Result<DeviceInfo, ClientError> {
        let reply = self.exchange(&commands::get_device_info()).await?;
        Ok(commands::parse_device_info(&reply)?)
    }

    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion, ClientError> {
        let reply = self.exchange(&commands::get_firmware_version()).await?;
        Ok(commands::parse_firmware_version(&reply)?)
    }

    pub async fn set_name(&mut self, name: &str) -> Result<(), ClientError> {
        let frame = commands::set_brick_name(name)?;
        self.exchange(&frame).await.map(|_| ())
    }
}

#[async_trait]
impl Exchange for RemoteBrick<'_> {
    async fn transact(&mut self, frame: &CommandFrame) -> Result<Reply, ProtoError> {
        self.exchange(frame).await.map_err(|e| match e {
            ClientError::Proto(inner) => inner,
            other => ProtoError::ConnectionLost(other.to_string()),
        })
    }
}
