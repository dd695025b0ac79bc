//! Bus sub-protocol: chunked multi-register read/write on the shared
//! low-speed bus
//!
//! A physical bus transaction moves at most 16 bytes. The device address
//! and register occupy two of them, so a logical write splits into chunks
//! of 14 data bytes; a logical read declares an expected receive count of
//! at most 15 and polls the port status until that many bytes are ready.
//! Every secondary-sensor driver is built on [`read`]/[`write`] plus the
//! three fixed discovery registers.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

use crate::commands;
use crate::error::ProtoError;
use crate::frame::{CommandFrame, Reply};

/// Largest read chunk per physical transaction.
pub const READ_CHUNK: usize = 15;

/// Largest write chunk per physical transaction (address and register
/// take the other two slots).
pub const WRITE_CHUNK: usize = 14;

/// Wall-clock bound on the status poll loop.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fixed discovery registers every bus device answers.
pub mod register {
    pub const VERSION: u8 = 0x00;
    pub const VENDOR_ID: u8 = 0x08;
    pub const DEVICE_ID: u8 = 0x10;
    /// Each discovery register is an 8-byte field.
    pub const FIELD_LEN: usize = 8;
}

/// The seam between protocol code and whatever moves telegrams to one
/// brick: the gateway's probes implement it over a raw link, the client
/// library over a SEND/RECV pair.
#[async_trait]
pub trait Exchange: Send {
    async fn transact(&mut self, frame: &CommandFrame) -> Result<Reply, ProtoError>;
}

/// Sensor port carrying the low-speed bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusPort(u8);

impl BusPort {
    pub fn new(port: u8) -> Result<Self, ProtoError> {
        if port > 3 {
            return Err(ProtoError::InvalidPort(port));
        }
        Ok(Self(port))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Chunked multi-register read. Registers advance with the bytes
/// retrieved; the logical read fails if any chunk fails.
pub async fn read<E: Exchange + ?Sized>(
    link: &mut E,
    port: BusPort,
    address: u8,
    mut register: u8,
    mut len: usize,
) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::with_capacity(len);

    while len > 0 {
        let expected = len.min(READ_CHUNK) as u8;

        let request = commands::ls_write(port.index(), &[address, register], expected)?;
        link.transact(&request).await?;

        wait_ready(link, port, expected).await?;

        let reply = link.transact(&commands::ls_read(port.index())).await?;
        let chunk = commands::parse_ls_read(&reply)?;
        trace!(port = port.index(), register, got = chunk.len(), "bus read chunk");

        if chunk.is_empty() {
            // A zero-byte chunk after a successful ready poll would loop
            // forever; treat it as the bus failing.
            return Err(ProtoError::BusTimeout {
                port: port.index(),
                ready: 0,
                expected,
            });
        }

        register = register.wrapping_add(chunk.len() as u8);
        len -= chunk.len().min(len);
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

/// Chunked multi-register write. No wait phase; each chunk is one
/// bus-write transaction carrying address, register and up to 14 bytes.
pub async fn write<E: Exchange + ?Sized>(
    link: &mut E,
    port: BusPort,
    address: u8,
    mut register: u8,
    data: &[u8],
) -> Result<(), ProtoError> {
    for chunk in data.chunks(WRITE_CHUNK) {
        let mut tx = Vec::with_capacity(2 + chunk.len());
        tx.push(address);
        tx.push(register);
        tx.extend_from_slice(chunk);

        let request = commands::ls_write(port.index(), &tx, 0)?;
        link.transact(&request).await?;
        trace!(port = port.index(), register, wrote = chunk.len(), "bus write chunk");

        register = register.wrapping_add(chunk.len() as u8);
    }
    Ok(())
}

/// Poll the port status until `expected` bytes are ready or the deadline
/// elapses.
async fn wait_ready<E: Exchange + ?Sized>(
    link: &mut E,
    port: BusPort,
    expected: u8,
) -> Result<(), ProtoError> {
    let deadline = Instant::now() + POLL_TIMEOUT;

    loop {
        let reply = link.transact(&commands::ls_get_status(port.index())).await?;
        let ready = commands::parse_ls_status(&reply)?;
        if ready >= expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ProtoError::BusTimeout {
                port: port.index(),
                ready,
                expected,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Firmware version, vendor id and device id strings from the fixed
/// discovery registers.
pub async fn identify<E: Exchange + ?Sized>(
    link: &mut E,
    port: BusPort,
    address: u8,
) -> Result<BusDeviceId, ProtoError> {
    let version = read(link, port, address, register::VERSION, register::FIELD_LEN).await?;
    let vendor = read(link, port, address, register::VENDOR_ID, register::FIELD_LEN).await?;
    let device = read(link, port, address, register::DEVICE_ID, register::FIELD_LEN).await?;
    Ok(BusDeviceId {
        version: trimmed(&version),
        vendor: trimmed(&vendor),
        device: trimmed(&device),
    })
}

/// Identity of one bus device, from its discovery registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDeviceId {
    pub version: String,
    pub vendor: String,
    pub device: String,
}

fn trimmed(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{parse_reply, TelegramKind, REPLY_MARKER};
    use crate::opcode;
    use rstest::rstest;

    /// Scripted bus device: answers status polls with everything ready
    /// and serves reads out of a flat register file.
    struct FakeBusDevice {
        registers: Vec<u8>,
        /// (opcode, tx payload) of every telegram seen, in order
        log: Vec<(u8, Vec<u8>)>,
        pending_read: u8,
        read_cursor: usize,
        /// Status polls to answer with 0 before reporting ready
        stall_polls: u32,
    }

    impl FakeBusDevice {
        fn new(registers: Vec<u8>) -> Self {
            Self {
                registers,
                log: Vec::new(),
                pending_read: 0,
                read_cursor: 0,
                stall_polls: 0,
            }
        }

        fn transactions(&self, op: u8) -> usize {
            self.log.iter().filter(|(o, _)| *o == op).count()
        }
    }

    #[async_trait]
    impl Exchange for FakeBusDevice {
        async fn transact(&mut self, frame: &CommandFrame) -> Result<Reply, ProtoError> {
            self.log.push((frame.opcode(), frame.payload().to_vec()));
            let raw = match frame.opcode() {
                opcode::LS_WRITE => {
                    let p = frame.payload();
                    let tx = &p[3..3 + p[1] as usize];
                    self.pending_read = p[2];
                    if self.pending_read > 0 {
                        // Read setup: [address, register]
                        self.read_cursor = tx[1] as usize;
                    } else {
                        // Data write: [address, register, data...]
                        let reg = tx[1] as usize;
                        for (i, &b) in tx[2..].iter().enumerate() {
                            if reg + i < self.registers.len() {
                                self.registers[reg + i] = b;
                            }
                        }
                    }
                    vec![REPLY_MARKER, opcode::LS_WRITE, 0x00]
                }
                opcode::LS_GET_STATUS => {
                    let ready = if self.stall_polls > 0 {
                        self.stall_polls -= 1;
                        0
                    } else {
                        self.pending_read
                    };
                    vec![REPLY_MARKER, opcode::LS_GET_STATUS, 0x00, ready]
                }
                opcode::LS_READ => {
                    let n = self.pending_read as usize;
                    let end = (self.read_cursor + n).min(self.registers.len());
                    let chunk = &self.registers[self.read_cursor..end];
                    let mut raw = vec![REPLY_MARKER, opcode::LS_READ, 0x00, chunk.len() as u8];
                    raw.extend_from_slice(chunk);
                    raw.extend(std::iter::repeat(0).take(16 - chunk.len()));
                    raw
                }
                other => vec![REPLY_MARKER, other, 0x00],
            };
            parse_reply(frame, &raw)
        }
    }

    fn port() -> BusPort {
        BusPort::new(0).unwrap()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(14, 1)]
    #[case(15, 1)]
    #[case(16, 2)]
    #[case(29, 2)]
    #[case(30, 2)]
    #[case(31, 3)]
    #[tokio::test]
    async fn read_chunk_counts(#[case] len: usize, #[case] chunks: usize) {
        let data: Vec<u8> = (0..len as u8).collect();
        let mut dev = FakeBusDevice::new(data.clone());

        let got = read(&mut dev, port(), 0x02, 0x00, len).await.unwrap();

        assert_eq!(got, data, "payload reassembles in order");
        assert_eq!(dev.transactions(opcode::LS_READ), chunks);
        assert_eq!(dev.transactions(opcode::LS_WRITE), chunks);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(14, 1)]
    #[case(15, 2)]
    #[case(16, 2)]
    #[case(29, 3)]
    #[case(30, 3)]
    #[case(31, 3)]
    #[tokio::test]
    async fn write_chunk_counts(#[case] len: usize, #[case] chunks: usize) {
        let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_add(1)).collect();
        let mut dev = FakeBusDevice::new(vec![0u8; len]);

        write(&mut dev, port(), 0x02, 0x00, &data).await.unwrap();

        assert_eq!(dev.registers, data, "registers receive the bytes in order");
        assert_eq!(dev.transactions(opcode::LS_WRITE), chunks);
        assert_eq!(dev.transactions(opcode::LS_GET_STATUS), 0, "writes never poll");
    }

    #[tokio::test]
    async fn poll_retries_until_ready() {
        let mut dev = FakeBusDevice::new(vec![1, 2, 3, 4]);
        dev.stall_polls = 3;

        let got = read(&mut dev, port(), 0x02, 0x00, 4).await.unwrap();
        assert_eq!(got, vec![1, 2, 3, 4]);
        assert_eq!(dev.transactions(opcode::LS_GET_STATUS), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out() {
        let mut dev = FakeBusDevice::new(vec![1, 2, 3, 4]);
        dev.stall_polls = u32::MAX; // never ready

        let err = read(&mut dev, port(), 0x02, 0x00, 4).await.unwrap_err();
        assert!(matches!(err, ProtoError::BusTimeout { expected: 4, .. }));
    }

    #[tokio::test]
    async fn brick_error_aborts_whole_read() {
        struct BusFault;

        #[async_trait]
        impl Exchange for BusFault {
            async fn transact(&mut self, frame: &CommandFrame) -> Result<Reply, ProtoError> {
                parse_reply(frame, &[REPLY_MARKER, frame.opcode(), 0xDD])
            }
        }

        let err = read(&mut BusFault, port(), 0x02, 0x00, 30).await.unwrap_err();
        assert!(matches!(err, ProtoError::Brick { .. }));
    }

    #[tokio::test]
    async fn identify_reads_three_registers() {
        let mut registers = vec![0u8; 24];
        registers[..4].copy_from_slice(b"V1.0");
        registers[8..12].copy_from_slice(b"LEGO");
        registers[16..21].copy_from_slice(b"Sonar");

        let mut dev = FakeBusDevice::new(registers);
        let id = identify(&mut dev, port(), 0x02).await.unwrap();
        assert_eq!(id.vendor, "LEGO");
        assert_eq!(id.device, "Sonar");
    }

    #[test]
    fn port_bounds() {
        assert!(BusPort::new(3).is_ok());
        assert!(matches!(BusPort::new(4), Err(ProtoError::InvalidPort(4))));
    }

    #[test]
    fn frames_kind_is_direct() {
        assert_eq!(commands::ls_get_status(0).kind(), TelegramKind::DirectReply);
    }
}
