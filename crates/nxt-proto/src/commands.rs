//! Builders and reply parsers for the telegrams the gateway and client
//! library exchange themselves. Sensor and file-system telegrams belong
//! to external collaborators built on the same [`CommandBuilder`].

use crate::error::ProtoError;
use crate::frame::{CommandBuilder, CommandFrame, Reply, TelegramKind};
use crate::opcode;

/// Brick name field width, terminating NUL included.
pub const NAME_FIELD: usize = 16;

/// Minimal liveness probe; the reply carries the sleep-timer limit.
pub fn keep_alive() -> CommandFrame {
    CommandBuilder::new(TelegramKind::DirectReply, opcode::KEEP_ALIVE)
        .build()
        .unwrap_or_else(|_| unreachable!("empty telegram always fits"))
}

/// Battery voltage query.
pub fn get_battery_level() -> CommandFrame {
    CommandBuilder::new(TelegramKind::DirectReply, opcode::GET_BATTERY_LEVEL)
        .build()
        .unwrap_or_else(|_| unreachable!("empty telegram always fits"))
}

pub fn parse_battery_level(reply: &Reply) -> Result<u16, ProtoError> {
    reply.reader().u16_le()
}

/// Name, Bluetooth address, signal strength and free flash.
pub fn get_device_info() -> CommandFrame {
    CommandBuilder::new(TelegramKind::SystemReply, opcode::GET_DEVICE_INFO)
        .build()
        .unwrap_or_else(|_| unreachable!("empty telegram always fits"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    /// Six address bytes; the seventh wire byte is padding.
    pub bt_address: [u8; 6],
    pub signal_strength: u32,
    pub free_flash: u32,
}

pub fn parse_device_info(reply: &Reply) -> Result<DeviceInfo, ProtoError> {
    let mut r = reply.reader();
    let name = r.str_trimmed(NAME_FIELD - 1)?;
    let addr = r.bytes(6)?;
    let _pad = r.u8()?;
    let signal_strength = r.u32_le()?;
    let free_flash = r.u32_le()?;
    let mut bt_address = [0u8; 6];
    bt_address.copy_from_slice(addr);
    Ok(DeviceInfo {
        name,
        bt_address,
        signal_strength,
        free_flash,
    })
}

/// Firmware and protocol version query.
pub fn get_firmware_version() -> CommandFrame {
    CommandBuilder::new(TelegramKind::SystemReply, opcode::GET_FIRMWARE_VERSION)
        .build()
        .unwrap_or_else(|_| unreachable!("empty telegram always fits"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// (major, minor)
    pub protocol: (u8, u8),
    /// (major, minor)
    pub firmware: (u8, u8),
}

pub fn parse_firmware_version(reply: &Reply) -> Result<FirmwareVersion, ProtoError> {
    let mut r = reply.reader();
    let proto_minor = r.u8()?;
    let proto_major = r.u8()?;
    let fw_minor = r.u8()?;
    let fw_major = r.u8()?;
    Ok(FirmwareVersion {
        protocol: (proto_major, proto_minor),
        firmware: (fw_major, fw_minor),
    })
}

/// Rename the brick. The name must fit the fixed field with its NUL.
pub fn set_brick_name(name: &str) -> Result<CommandFrame, ProtoError> {
    CommandBuilder::new(TelegramKind::SystemReply, opcode::SET_BRICK_NAME)
        .str_padded(name, NAME_FIELD)
        .build()
}

// Bus sub-protocol telegrams. `tx` already carries the device address and
// register; `rx_len` declares how many bytes the next bus-read should
// return.

pub fn ls_write(port: u8, tx: &[u8], rx_len: u8) -> Result<CommandFrame, ProtoError> {
    CommandBuilder::new(TelegramKind::DirectReply, opcode::LS_WRITE)
        .u8(port)
        .u8(tx.len() as u8)
        .u8(rx_len)
        .bytes(tx)
        .build()
}

pub fn ls_get_status(port: u8) -> CommandFrame {
    CommandBuilder::new(TelegramKind::DirectReply, opcode::LS_GET_STATUS)
        .u8(port)
        .build()
        .unwrap_or_else(|_| unreachable!("one-byte telegram always fits"))
}

/// Bytes ready on the port, per the last status poll.
pub fn parse_ls_status(reply: &Reply) -> Result<u8, ProtoError> {
    reply.reader().u8()
}

pub fn ls_read(port: u8) -> CommandFrame {
    CommandBuilder::new(TelegramKind::DirectReply, opcode::LS_READ)
        .u8(port)
        .build()
        .unwrap_or_else(|_| unreachable!("one-byte telegram always fits"))
}

/// The bus-read reply is a length byte followed by a fixed 16-byte data
/// block; only the first `length` bytes are valid.
pub fn parse_ls_read(reply: &Reply) -> Result<Vec<u8>, ProtoError> {
    let mut r = reply.reader();
    let len = r.u8()? as usize;
    let data = r.rest();
    if data.len() < len {
        return Err(ProtoError::Truncated {
            needed: len - data.len(),
        });
    }
    Ok(data[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{parse_reply, REPLY_MARKER};

    #[test]
    fn keep_alive_is_two_bytes() {
        assert_eq!(keep_alive().to_bytes(), vec![0x00, 0x0D]);
    }

    #[test]
    fn device_info_parses() {
        let frame = get_device_info();
        let mut raw = vec![REPLY_MARKER, opcode::GET_DEVICE_INFO, 0x00];
        let mut name = [0u8; 15];
        name[..3].copy_from_slice(b"NXT");
        raw.extend_from_slice(&name);
        raw.extend_from_slice(&[0x00, 0x16, 0x53, 0x01, 0x02, 0x03, 0x00]); // addr + pad
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&64000u32.to_le_bytes());

        let reply = parse_reply(&frame, &raw).unwrap();
        let info = parse_device_info(&reply).unwrap();
        assert_eq!(info.name, "NXT");
        assert_eq!(info.bt_address, [0x00, 0x16, 0x53, 0x01, 0x02, 0x03]);
        assert_eq!(info.free_flash, 64000);
    }

    #[test]
    fn firmware_version_parses() {
        let frame = get_firmware_version();
        let raw = [REPLY_MARKER, opcode::GET_FIRMWARE_VERSION, 0x00, 124, 1, 3, 1];
        let reply = parse_reply(&frame, &raw).unwrap();
        let v = parse_firmware_version(&reply).unwrap();
        assert_eq!(v.protocol, (1, 124));
        assert_eq!(v.firmware, (1, 3));
    }

    #[test]
    fn set_brick_name_rejects_long_names() {
        assert!(set_brick_name("a-name-that-is-too-long").is_err());
        let frame = set_brick_name("shorty").unwrap();
        assert_eq!(frame.to_bytes().len(), 2 + NAME_FIELD);
    }

    #[test]
    fn ls_write_layout() {
        let frame = ls_write(1, &[0x02, 0x42, 0xAA], 4).unwrap();
        assert_eq!(
            frame.to_bytes(),
            vec![0x00, 0x0F, 0x01, 0x03, 0x04, 0x02, 0x42, 0xAA]
        );
    }

    #[test]
    fn ls_read_takes_declared_length() {
        let frame = ls_read(0);
        let mut raw = vec![REPLY_MARKER, opcode::LS_READ, 0x00, 0x03];
        raw.extend_from_slice(&[7, 8, 9]);
        raw.extend_from_slice(&[0u8; 13]); // padding up to the fixed block
        let reply = parse_reply(&frame, &raw).unwrap();
        assert_eq!(parse_ls_read(&reply).unwrap(), vec![7, 8, 9]);
    }
}
