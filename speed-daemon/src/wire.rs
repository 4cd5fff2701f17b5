//! The framed binary message set spoken over each Speed Daemon
//! connection (§4.4). All integers are big-endian; strings are a
//! single length byte followed by that many bytes.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const TYPE_ERROR: u8 = 0x10;
const TYPE_PLATE: u8 = 0x20;
const TYPE_TICKET: u8 = 0x21;
const TYPE_WANT_HEARTBEAT: u8 = 0x40;
const TYPE_HEARTBEAT: u8 = 0x41;
const TYPE_I_AM_CAMERA: u8 = 0x80;
const TYPE_I_AM_DISPATCHER: u8 = 0x81;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Plate { plate: Vec<u8>, timestamp: u32 },
    WantHeartbeat { interval: u32 },
    IAmCamera { road: u16, mile: u16, limit: u16 },
    IAmDispatcher { roads: Vec<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub plate: Vec<u8>,
    pub road: u16,
    pub mile1: u16,
    pub timestamp1: u32,
    pub mile2: u16,
    pub timestamp2: u32,
    pub speed_hundredths: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Error { message: String },
    Ticket(Ticket),
    Heartbeat,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown message type: 0x{0:02x}")]
    UnknownType(u8),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = ClientMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&tag) = src.first() else { return Ok(None) };

        match tag {
            TYPE_PLATE => decode_plate(src),
            TYPE_WANT_HEARTBEAT => decode_want_heartbeat(src),
            TYPE_I_AM_CAMERA => decode_i_am_camera(src),
            TYPE_I_AM_DISPATCHER => decode_i_am_dispatcher(src),
            other => Err(Error::UnknownType(other)),
        }
    }
}

/// Reads the length of a length-prefixed `str` field at `offset`
/// without consuming it, or `None` if not enough bytes have arrived
/// yet to even know the length.
fn peek_str_len(src: &[u8], offset: usize) -> Option<usize> {
    src.get(offset).map(|&len| len as usize)
}

fn decode_plate(src: &mut BytesMut) -> Result<Option<ClientMessage>, Error> {
    let Some(strlen) = peek_str_len(src, 1) else { return Ok(None) };
    let total = 1 + 1 + strlen + 4;
    if src.len() < total {
        return Ok(None);
    }

    let mut buf = src.split_to(total);
    buf.advance(2);
    let plate = buf.split_to(strlen).to_vec();
    let timestamp = buf.get_u32();
    Ok(Some(ClientMessage::Plate { plate, timestamp }))
}

fn decode_want_heartbeat(src: &mut BytesMut) -> Result<Option<ClientMessage>, Error> {
    let total = 1 + 4;
    if src.len() < total {
        return Ok(None);
    }

    let mut buf = src.split_to(total);
    buf.advance(1);
    let interval = buf.get_u32();
    Ok(Some(ClientMessage::WantHeartbeat { interval }))
}

fn decode_i_am_camera(src: &mut BytesMut) -> Result<Option<ClientMessage>, Error> {
    let total = 1 + 2 + 2 + 2;
    if src.len() < total {
        return Ok(None);
    }

    let mut buf = src.split_to(total);
    buf.advance(1);
    let road = buf.get_u16();
    let mile = buf.get_u16();
    let limit = buf.get_u16();
    Ok(Some(ClientMessage::IAmCamera { road, mile, limit }))
}

fn decode_i_am_dispatcher(src: &mut BytesMut) -> Result<Option<ClientMessage>, Error> {
    let Some(count) = peek_str_len(src, 1) else { return Ok(None) };
    let total = 1 + 1 + count * 2;
    if src.len() < total {
        return Ok(None);
    }

    let mut buf = src.split_to(total);
    buf.advance(2);
    let roads = (0..count).map(|_| buf.get_u16()).collect();
    Ok(Some(ClientMessage::IAmDispatcher { roads }))
}

impl Encoder<ServerMessage> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            ServerMessage::Heartbeat => dst.put_u8(TYPE_HEARTBEAT),
            ServerMessage::Error { message } => {
                dst.put_u8(TYPE_ERROR);
                put_str(dst, message.as_bytes());
            }
            ServerMessage::Ticket(ticket) => {
                dst.put_u8(TYPE_TICKET);
                put_str(dst, &ticket.plate);
                dst.put_u16(ticket.road);
                dst.put_u16(ticket.mile1);
                dst.put_u32(ticket.timestamp1);
                dst.put_u16(ticket.mile2);
                dst.put_u32(ticket.timestamp2);
                dst.put_u16(ticket.speed_hundredths);
            }
        }
        Ok(())
    }
}

fn put_str(dst: &mut BytesMut, bytes: &[u8]) {
    let len = bytes.len().min(u8::MAX as usize);
    dst.put_u8(len as u8);
    dst.extend_from_slice(&bytes[..len]);
}
