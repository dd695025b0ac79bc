//! Telegram exchange over a raw transport link.

use async_trait::async_trait;
use nxt_proto::{commands, parse_reply, CommandFrame, Exchange, ProtoError, Reply, MAX_TELEGRAM};
use nxt_transport::BrickLink;

/// Adapts a [`BrickLink`] byte channel to the telegram-level
/// [`Exchange`] trait: serialize, send, and read back one reply when
/// the telegram kind asks for one.
pub struct LinkExchange<'a> {
    link: &'a mut dyn BrickLink,
}

impl<'a> LinkExchange<'a> {
    pub fn new(link: &'a mut dyn BrickLink) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Exchange for LinkExchange<'_> {
    async fn transact(&mut self, frame: &CommandFrame) -> Result<Reply, ProtoError> {
        self.link
            .send(&frame.to_bytes())
            .await
            .map_err(|e| ProtoError::ConnectionLost(e.to_string()))?;
        if !frame.wants_reply() {
            return Ok(Reply {
                opcode: frame.opcode(),
                status: nxt_proto::BrickStatus::Success,
                payload: Vec::new(),
            });
        }
        let raw = self
            .link
            .recv(MAX_TELEGRAM)
            .await
            .map_err(|e| ProtoError::ConnectionLost(e.to_string()))?;
        parse_reply(frame, &raw)
    }
}

/// Minimal liveness check: one keep-alive round trip.
pub async fn probe(link: &mut dyn BrickLink) -> Result<(), ProtoError> {
    LinkExchange::new(link)
        .transact(&commands::keep_alive())
        .await
        .map(|_| ())
}

/// Resolve a brick's name over an open link. Used for USB devices,
/// where enumeration cannot see the name.
pub async fn read_brick_name(link: &mut dyn BrickLink) -> Result<String, ProtoError> {
    let reply = LinkExchange::new(link)
        .transact(&commands::get_device_info())
        .await?;
    Ok(commands::parse_device_info(&reply)?.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxt_transport::mock::{MockBrick, MockBus};
    use nxt_transport::{BrickId, BrickTransport, ConnectionKind};

    async fn open_link(bus: &MockBus) -> Box<dyn BrickLink> {
        let transport = bus.transport(ConnectionKind::Usb);
        let cand = transport.enumerate().await.unwrap().remove(0);
        transport.open(&cand).await.unwrap()
    }

    #[tokio::test]
    async fn probe_round_trips_a_keep_alive() {
        let bus = MockBus::new();
        bus.plug(MockBrick::new(
            BrickId::from_usb(1, 4),
            ConnectionKind::Usb,
            "NXT",
        ));
        let mut link = open_link(&bus).await;
        probe(link.as_mut()).await.unwrap();
    }

    #[tokio::test]
    async fn probe_fails_on_unplugged_brick() {
        let bus = MockBus::new();
        let brick = MockBrick::new(BrickId::from_usb(1, 4), ConnectionKind::Usb, "NXT");
        bus.plug(brick.clone());
        let mut link = open_link(&bus).await;

        brick.set_connected(false);
        assert!(matches!(
            probe(link.as_mut()).await,
            Err(ProtoError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn reads_the_name_over_the_link() {
        let bus = MockBus::new();
        bus.plug(MockBrick::new(
            BrickId::from_usb(1, 4),
            ConnectionKind::Usb,
            "MyBrick",
        ));
        let mut link = open_link(&bus).await;
        assert_eq!(read_brick_name(link.as_mut()).await.unwrap(), "MyBrick");
    }
}
