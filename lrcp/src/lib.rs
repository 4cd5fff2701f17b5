//! Line Reversal Control Protocol.
//!
//! LRCP is a reliability layer on top of unordered, unreliable UDP
//! datagrams: it gives each peer an ordered, acknowledged,
//! retransmitted byte stream keyed by a session id. This crate's
//! default application on top of that stream is a line reverser: every
//! newline-terminated line it receives is echoed back with its bytes
//! reversed.
//!
//! See [`lrcp::packets`] for the wire format and [`lrcp::protocol`] for
//! the client-facing [`lrcp::protocol::Socket`].

pub mod lrcp;
mod registry;
mod reverser;
mod session;

use tokio::net::UdpSocket;

use reverser::LineReverser;

/// The application layer a server-side LRCP session feeds its ordered
/// byte stream into, and reads replies back out of.
pub trait SocketHandler: Default + Send + 'static {
    /// Consumes newly-arrived, in-order application bytes and returns
    /// whatever output they produced.
    fn process(&mut self, input: &[u8]) -> Vec<u8>;
}

/// The line-reversal application required by this protocol's spec.
#[derive(Default)]
pub struct DefaultSocketHandler(LineReverser);

impl SocketHandler for DefaultSocketHandler {
    fn process(&mut self, input: &[u8]) -> Vec<u8> {
        self.0.feed(input)
    }
}

/// Runs the LRCP server loop over `socket`, applying `H` to every
/// session's ordered byte stream.
///
/// # Errors
/// Propagates a fatal socket error.
pub async fn run<H: SocketHandler>(socket: UdpSocket) -> std::io::Result<()> {
    registry::run::<H>(socket).await
}
