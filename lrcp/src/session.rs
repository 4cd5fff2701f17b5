//! The per-session reliability state machine (§4.2 of the protocol).
//!
//! [`SessionCore`] is transport-agnostic: it consumes inbound [`Packet`]s
//! and produces outbound ones, plus any inbound application bytes that
//! became deliverable. Both the server-side [`crate::registry::SessionRegistry`]
//! and the client-side [`crate::lrcp::protocol::Socket`] drive one of
//! these each.

use crate::lrcp::packets::Packet;

/// Outbound datagrams carry at most this many payload bytes, leaving
/// headroom under the 1000-byte datagram cap for framing and escaping.
const MAX_PAYLOAD: usize = 800;

#[derive(Debug, Default)]
pub struct Effects {
    pub send: Vec<Packet>,
    pub delivered: Option<Vec<u8>>,
    pub close: bool,
}

impl Effects {
    fn send(packets: Vec<Packet>) -> Self {
        Self { send: packets, delivered: None, close: false }
    }

    fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct SessionCore {
    sid: u32,
    rcv_acked: u32,
    send_buffer: Vec<u8>,
    send_acked: u32,
    closed: bool,
}

impl SessionCore {
    #[must_use]
    pub fn new(sid: u32) -> Self {
        Self { sid, rcv_acked: 0, send_buffer: Vec::new(), send_acked: 0, closed: false }
    }

    #[must_use]
    pub fn sid(&self) -> u32 {
        self.sid
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `connect` always acks position 0, regardless of how far the
    /// session has actually progressed — repeated `connect` frames on an
    /// already-open session resend that same ack.
    pub fn handle_connect(&mut self) -> Effects {
        if self.closed {
            return Effects::send(vec![Packet::Close { session: self.sid }]);
        }
        Effects::send(vec![Packet::Ack { session: self.sid, length: 0 }])
    }

    pub fn handle_data(&mut self, pos: u32, payload: Vec<u8>) -> Effects {
        if self.closed {
            return Effects::none();
        }

        match pos.cmp(&self.rcv_acked) {
            std::cmp::Ordering::Greater => {
                let ack = Packet::Ack { session: self.sid, length: self.rcv_acked };
                Effects::send(vec![ack.clone(), ack])
            }
            std::cmp::Ordering::Less => {
                let mut send = vec![Packet::Ack { session: self.sid, length: self.rcv_acked }];
                send.extend(self.chunk_from(pos));
                Effects::send(send)
            }
            std::cmp::Ordering::Equal => {
                self.rcv_acked += payload.len() as u32;
                Effects {
                    send: vec![Packet::Ack { session: self.sid, length: self.rcv_acked }],
                    delivered: Some(payload),
                    close: false,
                }
            }
        }
    }

    pub fn handle_ack(&mut self, pos: u32) -> Effects {
        if self.closed {
            return Effects::none();
        }

        if pos as usize > self.send_buffer.len() {
            self.closed = true;
            Effects { send: vec![Packet::Close { session: self.sid }], delivered: None, close: true }
        } else {
            self.send_acked = self.send_acked.max(pos);
            Effects::none()
        }
    }

    pub fn handle_close(&mut self) -> Effects {
        let already_closed = self.closed;
        self.closed = true;
        if already_closed {
            Effects::none()
        } else {
            Effects { send: vec![Packet::Close { session: self.sid }], delivered: None, close: true }
        }
    }

    /// Appends application output to the outbound stream and returns the
    /// datagrams needed to transmit the new suffix.
    pub fn queue_send(&mut self, bytes: &[u8]) -> Vec<Packet> {
        if self.closed || bytes.is_empty() {
            return Vec::new();
        }
        let start = self.send_buffer.len() as u32;
        self.send_buffer.extend_from_slice(bytes);
        self.chunk_from(start)
    }

    #[must_use]
    pub fn needs_retransmit(&self) -> bool {
        !self.closed && (self.send_acked as usize) < self.send_buffer.len()
    }

    #[must_use]
    pub fn retransmit(&self) -> Vec<Packet> {
        self.chunk_from(self.send_acked)
    }

    fn chunk_from(&self, from: u32) -> Vec<Packet> {
        let from = from as usize;
        if from >= self.send_buffer.len() {
            return Vec::new();
        }

        let mut packets = Vec::new();
        let mut pos = from;
        for chunk in self.send_buffer[from..].chunks(MAX_PAYLOAD) {
            packets.push(Packet::Data { session: self.sid, pos: pos as u32, data: chunk.to_vec() });
            pos += chunk.len();
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_acks_zero() {
        let mut session = SessionCore::new(1);
        let effects = session.handle_connect();
        assert_eq!(effects.send, vec![Packet::Ack { session: 1, length: 0 }]);
    }

    #[test]
    fn in_order_data_delivers_and_acks() {
        let mut session = SessionCore::new(1);
        session.handle_connect();
        let effects = session.handle_data(0, b"hello\n".to_vec());
        assert_eq!(effects.delivered, Some(b"hello\n".to_vec()));
        assert_eq!(effects.send, vec![Packet::Ack { session: 1, length: 6 }]);
    }

    #[test]
    fn gap_sends_duplicate_ack_and_drops_payload() {
        let mut session = SessionCore::new(1);
        let effects = session.handle_data(5, b"xxxxx\n".to_vec());
        assert_eq!(effects.delivered, None);
        assert_eq!(
            effects.send,
            vec![Packet::Ack { session: 1, length: 0 }, Packet::Ack { session: 1, length: 0 }]
        );
    }

    #[test]
    fn ack_past_buffer_closes_session() {
        let mut session = SessionCore::new(1);
        session.queue_send(b"hi");
        let effects = session.handle_ack(10);
        assert!(session.is_closed());
        assert_eq!(effects.send, vec![Packet::Close { session: 1 }]);
    }

    #[test]
    fn retransmit_only_while_unacked() {
        let mut session = SessionCore::new(1);
        session.queue_send(b"hello");
        assert!(session.needs_retransmit());
        session.handle_ack(5);
        assert!(!session.needs_retransmit());
    }

    #[test]
    fn duplicate_data_resends_from_the_peers_claimed_position() {
        let mut session = SessionCore::new(1);
        session.queue_send(b"hello world");
        session.handle_data(0, b"hi\n".to_vec());
        assert_eq!(session.rcv_acked, 3);

        let effects = session.handle_data(1, b"xxx".to_vec());
        assert_eq!(effects.send[0], Packet::Ack { session: 1, length: 3 });
        assert_eq!(
            effects.send[1],
            Packet::Data { session: 1, pos: 1, data: b"ello world".to_vec() }
        );
    }

    #[test]
    fn duplicate_data_past_the_send_buffer_resends_nothing() {
        let mut session = SessionCore::new(1);
        session.queue_send(b"hi");
        session.handle_data(0, b"hello\n".to_vec());
        assert_eq!(session.rcv_acked, 6);

        let effects = session.handle_data(5, b"xxx".to_vec());
        assert_eq!(effects.send, vec![Packet::Ack { session: 1, length: 6 }]);
    }

    #[test]
    fn large_send_is_chunked_under_payload_cap() {
        let mut session = SessionCore::new(1);
        let data = vec![b'a'; 2000];
        let packets = session.queue_send(&data);
        assert!(packets.len() >= 3);
        for packet in &packets {
            if let Packet::Data { data, .. } = packet {
                assert!(data.len() <= MAX_PAYLOAD);
            }
        }
    }
}
