//! Encoding and decoding of session packets.
//!
//! Decoders take a complete packet (header plus payload). Servers that
//! read from a stream first pull [`HEADER_LEN`] bytes, validate them
//! with [`header_payload_len`], then read exactly that many payload
//! bytes before decoding.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::packet::{BrickEntry, Command, Password, Reply, Request, WireStatus};
use crate::{HEADER_LEN, MAGIC, MAX_PACKET, NAME_LEN, PASSWORD_LEN, REPLY_FLAG};

const ENTRY_LEN: usize = 2 + 6 + NAME_LEN;

/// Structural packet violation. A server closes the connection on any
/// of these rather than replying.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireCodecError {
    #[error("bad packet magic")]
    BadMagic,
    #[error("unknown command byte 0x{0:02X}")]
    UnknownCommand(u8),
    #[error("command byte 0x{0:02X} has wrong direction bit")]
    WrongDirection(u8),
    #[error("packet size {size} out of bounds")]
    SizeOutOfBounds { size: usize },
    #[error("packet truncated, {needed} more bytes expected")]
    Truncated { needed: usize },
    #[error("payload too large to encode ({len} bytes)")]
    PayloadTooLarge { len: usize },
    #[error("{0} bytes of trailing garbage after payload")]
    TrailingBytes(usize),
}

fn put_header(buf: &mut BytesMut, command: u8, total: usize, error: u8, password: &Password) {
    buf.put_slice(&MAGIC);
    buf.put_u8(command);
    buf.put_u16(total as u16);
    buf.put_u8(error);
    buf.put_slice(password.as_bytes());
}

fn check_total(total: usize) -> Result<(), WireCodecError> {
    if total > MAX_PACKET {
        return Err(WireCodecError::PayloadTooLarge {
            len: total - HEADER_LEN,
        });
    }
    Ok(())
}

/// Encode a client request, stamping the caller's password into the
/// header.
pub fn encode_request(request: &Request, password: &Password) -> Result<Vec<u8>, WireCodecError> {
    let payload_len = match request {
        Request::List => 0,
        Request::Send { data, .. } => 1 + 2 + data.len(),
        Request::Recv { .. } => 1 + 2,
    };
    let total = HEADER_LEN + payload_len;
    check_total(total)?;

    let mut buf = BytesMut::with_capacity(total);
    put_header(&mut buf, request.command() as u8, total, 0, password);
    match request {
        Request::List => {}
        Request::Send { handle, data } => {
            buf.put_u8(*handle);
            buf.put_u16(data.len() as u16);
            buf.put_slice(data);
        }
        Request::Recv { handle, max_len } => {
            buf.put_u8(*handle);
            buf.put_u16(*max_len);
        }
    }
    Ok(buf.to_vec())
}

/// Encode a server reply. The password field of a reply is always
/// zero-filled; the secret never travels back.
pub fn encode_reply(
    command: Command,
    status: WireStatus,
    reply: &Reply,
) -> Result<Vec<u8>, WireCodecError> {
    let payload_len = match reply {
        Reply::List { bricks } => 1 + bricks.len() * ENTRY_LEN,
        Reply::Send { .. } => 2,
        Reply::Recv { data } => 2 + data.len(),
        Reply::Empty => 0,
    };
    let total = HEADER_LEN + payload_len;
    check_total(total)?;

    let mut buf = BytesMut::with_capacity(total);
    put_header(
        &mut buf,
        command as u8 | REPLY_FLAG,
        total,
        status.into(),
        &Password::empty(),
    );
    match reply {
        Reply::List { bricks } => {
            buf.put_u8(bricks.len() as u8);
            for entry in bricks {
                buf.put_u8(entry.handle);
                buf.put_u8(entry.is_bt as u8);
                buf.put_slice(&entry.id);
                buf.put_slice(&entry.name);
            }
        }
        Reply::Send { written } => buf.put_u16(*written),
        Reply::Recv { data } => {
            buf.put_u16(data.len() as u16);
            buf.put_slice(data);
        }
        Reply::Empty => {}
    }
    Ok(buf.to_vec())
}

/// Header-only reply echoing an arbitrary command byte. Used for the
/// unknown-command error, where no [`Command`] value exists to echo.
pub fn encode_raw_reply(command_byte: u8, status: WireStatus) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    put_header(
        &mut buf,
        command_byte | REPLY_FLAG,
        HEADER_LEN,
        status.into(),
        &Password::empty(),
    );
    buf.to_vec()
}

/// Validate a raw header and return how many payload bytes follow it.
pub fn header_payload_len(header: &[u8; HEADER_LEN]) -> Result<usize, WireCodecError> {
    if header[..4] != MAGIC {
        return Err(WireCodecError::BadMagic);
    }
    let size = u16::from_be_bytes([header[5], header[6]]) as usize;
    if size < HEADER_LEN || size > MAX_PACKET {
        return Err(WireCodecError::SizeOutOfBounds { size });
    }
    Ok(size - HEADER_LEN)
}

/// Extract the password field from a raw header. Servers gate on it
/// before the command byte is even mapped.
pub fn header_password(header: &[u8; HEADER_LEN]) -> Password {
    let mut field = [0u8; PASSWORD_LEN];
    field.copy_from_slice(&header[8..8 + PASSWORD_LEN]);
    Password(field)
}

struct Header {
    command_byte: u8,
    payload_len: usize,
    error: u8,
    password: Password,
}

fn take_header(buf: &mut &[u8]) -> Result<Header, WireCodecError> {
    if buf.remaining() < HEADER_LEN {
        return Err(WireCodecError::Truncated {
            needed: HEADER_LEN - buf.remaining(),
        });
    }
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(WireCodecError::BadMagic);
    }
    let command_byte = buf.get_u8();
    let size = buf.get_u16() as usize;
    if size < HEADER_LEN || size > MAX_PACKET {
        return Err(WireCodecError::SizeOutOfBounds { size });
    }
    let error = buf.get_u8();
    let mut password = [0u8; PASSWORD_LEN];
    buf.copy_to_slice(&mut password);
    Ok(Header {
        command_byte,
        payload_len: size - HEADER_LEN,
        error,
        password: Password(password),
    })
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), WireCodecError> {
    if buf.remaining() < needed {
        Err(WireCodecError::Truncated {
            needed: needed - buf.remaining(),
        })
    } else {
        Ok(())
    }
}

fn finish(buf: &[u8]) -> Result<(), WireCodecError> {
    if buf.has_remaining() {
        Err(WireCodecError::TrailingBytes(buf.remaining()))
    } else {
        Ok(())
    }
}

/// Decode one complete client packet. Returns the request and the
/// password presented with it; the caller decides whether it matches.
pub fn decode_request(packet: &[u8]) -> Result<(Request, Password), WireCodecError> {
    let mut buf = packet;
    let header = take_header(&mut buf)?;
    if header.command_byte & REPLY_FLAG != 0 {
        return Err(WireCodecError::WrongDirection(header.command_byte));
    }
    let command = Command::from_byte(header.command_byte)
        .ok_or(WireCodecError::UnknownCommand(header.command_byte))?;
    ensure(buf, header.payload_len)?;

    let request = match command {
        Command::List => Request::List,
        Command::Send => {
            ensure(buf, 3)?;
            let handle = buf.get_u8();
            let len = buf.get_u16() as usize;
            ensure(buf, len)?;
            let mut data = vec![0u8; len];
            buf.copy_to_slice(&mut data);
            Request::Send { handle, data }
        }
        Command::Recv => {
            ensure(buf, 3)?;
            let handle = buf.get_u8();
            let max_len = buf.get_u16();
            Request::Recv { handle, max_len }
        }
    };
    finish(buf)?;
    Ok((request, header.password))
}

/// Decode one complete server packet. A non-`Ok` status always carries
/// an empty body; the payload is only interpreted on success.
pub fn decode_reply(packet: &[u8]) -> Result<(Command, WireStatus, Reply), WireCodecError> {
    let mut buf = packet;
    let header = take_header(&mut buf)?;
    if header.command_byte & REPLY_FLAG == 0 {
        return Err(WireCodecError::WrongDirection(header.command_byte));
    }
    let raw = header.command_byte & !REPLY_FLAG;
    let command = Command::from_byte(raw).ok_or(WireCodecError::UnknownCommand(raw))?;
    let status = WireStatus::from(header.error);
    ensure(buf, header.payload_len)?;

    if status != WireStatus::Ok {
        finish(buf)?;
        return Ok((command, status, Reply::Empty));
    }

    let reply = match command {
        Command::List => {
            ensure(buf, 1)?;
            let count = buf.get_u8() as usize;
            ensure(buf, count * ENTRY_LEN)?;
            let mut bricks = Vec::with_capacity(count);
            for _ in 0..count {
                let handle = buf.get_u8();
                let is_bt = buf.get_u8() != 0;
                let mut id = [0u8; 6];
                buf.copy_to_slice(&mut id);
                let mut name = [0u8; NAME_LEN];
                buf.copy_to_slice(&mut name);
                bricks.push(BrickEntry {
                    handle,
                    is_bt,
                    id,
                    name,
                });
            }
            Reply::List { bricks }
        }
        Command::Send => {
            ensure(buf, 2)?;
            Reply::Send {
                written: buf.get_u16(),
            }
        }
        Command::Recv => {
            ensure(buf, 2)?;
            let len = buf.get_u16() as usize;
            ensure(buf, len)?;
            let mut data = vec![0u8; len];
            buf.copy_to_slice(&mut data);
            Reply::Recv { data }
        }
    };
    finish(buf)?;
    Ok((command, status, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secret() -> Password {
        Password::from("hunter2")
    }

    fn entry() -> BrickEntry {
        let mut name = [0u8; NAME_LEN];
        name[..3].copy_from_slice(b"NXT");
        BrickEntry {
            handle: 0,
            is_bt: false,
            id: [0, 0, 0, 0, 1, 4],
            name,
        }
    }

    #[test]
    fn list_request_is_header_only() {
        let bytes = encode_request(&Request::List, &secret()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..4], b"NXT\0");
        assert_eq!(bytes[4], Command::List as u8);
        assert_eq!(u16::from_be_bytes([bytes[5], bytes[6]]), HEADER_LEN as u16);
        assert_eq!(&bytes[8..15], b"hunter2");

        let (request, password) = decode_request(&bytes).unwrap();
        assert_eq!(request, Request::List);
        assert_eq!(password, secret());
    }

    #[test]
    fn send_request_round_trip() {
        let request = Request::Send {
            handle: 3,
            data: vec![0x00, 0x0D],
        };
        let bytes = encode_request(&request, &secret()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        // handle, then big-endian length, then the telegram bytes
        assert_eq!(&bytes[HEADER_LEN..], &[3, 0, 2, 0x00, 0x0D]);

        let (decoded, _) = decode_request(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn recv_request_round_trip() {
        let request = Request::Recv {
            handle: 7,
            max_len: 64,
        };
        let bytes = encode_request(&request, &secret()).unwrap();
        let (decoded, _) = decode_request(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn list_reply_round_trip() {
        let reply = Reply::List {
            bricks: vec![entry()],
        };
        let bytes = encode_reply(Command::List, WireStatus::Ok, &reply).unwrap();
        assert_eq!(bytes[4], Command::List as u8 | REPLY_FLAG);
        // replies never echo the password back
        assert_eq!(&bytes[8..24], &[0u8; PASSWORD_LEN]);
        assert_eq!(bytes[HEADER_LEN], 1);

        let (command, status, decoded) = decode_reply(&bytes).unwrap();
        assert_eq!(command, Command::List);
        assert_eq!(status, WireStatus::Ok);
        assert_eq!(decoded, reply);
    }

    #[test]
    fn send_and_recv_reply_round_trip() {
        let bytes =
            encode_reply(Command::Send, WireStatus::Ok, &Reply::Send { written: 2 }).unwrap();
        let (_, _, decoded) = decode_reply(&bytes).unwrap();
        assert_eq!(decoded, Reply::Send { written: 2 });

        let reply = Reply::Recv {
            data: vec![0x02, 0x0D, 0x00],
        };
        let bytes = encode_reply(Command::Recv, WireStatus::Ok, &reply).unwrap();
        let (_, _, decoded) = decode_reply(&bytes).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn error_reply_carries_no_body() {
        let bytes =
            encode_reply(Command::Send, WireStatus::NoSuchHandle, &Reply::Empty).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let (command, status, reply) = decode_reply(&bytes).unwrap();
        assert_eq!(command, Command::Send);
        assert_eq!(status, WireStatus::NoSuchHandle);
        assert_eq!(reply, Reply::Empty);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_request(&Request::List, &secret()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode_request(&bytes), Err(WireCodecError::BadMagic));
    }

    #[test]
    fn size_bounds_are_enforced() {
        let mut bytes = encode_request(&Request::List, &secret()).unwrap();
        bytes[5] = 0xFF;
        bytes[6] = 0xFF;
        assert!(matches!(
            decode_request(&bytes),
            Err(WireCodecError::SizeOutOfBounds { .. })
        ));

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[5] = 0;
        header[6] = 4; // smaller than the header itself
        assert!(matches!(
            header_payload_len(&header),
            Err(WireCodecError::SizeOutOfBounds { size: 4 })
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let request = Request::Send {
            handle: 0,
            data: vec![1, 2, 3, 4],
        };
        let bytes = encode_request(&request, &secret()).unwrap();
        assert!(matches!(
            decode_request(&bytes[..bytes.len() - 2]),
            Err(WireCodecError::Truncated { .. })
        ));
    }

    #[test]
    fn direction_bit_separates_the_streams() {
        let request_bytes = encode_request(&Request::List, &secret()).unwrap();
        assert!(matches!(
            decode_reply(&request_bytes),
            Err(WireCodecError::WrongDirection(_))
        ));

        let reply_bytes = encode_reply(
            Command::List,
            WireStatus::Ok,
            &Reply::List { bricks: vec![] },
        )
        .unwrap();
        assert!(matches!(
            decode_request(&reply_bytes),
            Err(WireCodecError::WrongDirection(_))
        ));
    }

    #[test]
    fn oversize_payload_refuses_to_encode() {
        let request = Request::Send {
            handle: 0,
            data: vec![0u8; MAX_PACKET],
        };
        assert!(matches!(
            encode_request(&request, &secret()),
            Err(WireCodecError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn header_payload_len_reads_the_size_field() {
        let request = Request::Recv {
            handle: 1,
            max_len: 64,
        };
        let bytes = encode_request(&request, &secret()).unwrap();
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        assert_eq!(header_payload_len(&header).unwrap(), 3);
    }

    #[test]
    fn header_password_reads_the_secret_field() {
        let bytes = encode_request(&Request::List, &secret()).unwrap();
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        assert_eq!(header_password(&header), secret());
    }

    #[test]
    fn password_is_nul_padded_and_truncated() {
        let short = Password::from("ab");
        assert_eq!(&short.0[..2], b"ab");
        assert!(short.0[2..].iter().all(|&b| b == 0));

        let long = Password::from("0123456789abcdefOVERFLOW");
        assert_eq!(&long.0, b"0123456789abcdef");
    }
}
