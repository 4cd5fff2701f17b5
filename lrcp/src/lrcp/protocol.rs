//! Transport abstraction and the client-facing [`Socket`].
//!
//! [`Endpoint`] lets a caller hand the session driver any datagram
//! transport (a real `UdpSocket`, or — as in the integration tests — an
//! in-process channel pair) by splitting it into a receive stream and a
//! send sink of [`Packet`]s. [`Socket::connect`] drives a client-side
//! session over such a transport and hands back a plain
//! `AsyncRead + AsyncWrite` stream of the session's application bytes.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::Rng;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};

use tracing::{debug, warn};

pub use crate::lrcp::packets::Packet;
use crate::lrcp::packets::MAX_NUMERIC_FIELD;
use crate::session::SessionCore;

const APP_BUFFER: usize = 64 * 1024;
const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(3);

/// A datagram transport that can be split into an inbound [`Packet`]
/// stream and an outbound [`Packet`] sink.
pub trait Endpoint<P, R, S> {
    fn split(self) -> (R, S);
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("peer closed the session")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// A client-side LRCP stream: writes become `data` frames, reads yield
/// the application bytes the peer has sent, in order.
pub struct Socket<H> {
    inner: DuplexStream,
    _handler: PhantomData<H>,
}

impl<H: Send + 'static> Socket<H> {
    /// Opens a new session over `endpoint`, choosing a random session id.
    ///
    /// # Errors
    /// Returns [`Error::Closed`] if the endpoint's send half is already
    /// gone before the initial `connect` frame could be queued.
    pub async fn connect<E>(endpoint: E) -> Result<Self, Error>
    where
        E: Endpoint<Packet, mpsc::UnboundedReceiver<Packet>, mpsc::UnboundedSender<Packet>>,
    {
        let (incoming, outgoing) = endpoint.split();
        let sid = rand::thread_rng().gen_range(0..=MAX_NUMERIC_FIELD);

        let (app_side, user_side) = tokio::io::duplex(APP_BUFFER);

        outgoing
            .send(Packet::Connect { session: sid })
            .map_err(|_| Error::Closed)?;

        tokio::spawn(drive_client_session(sid, incoming, outgoing, app_side));

        Ok(Self { inner: user_side, _handler: PhantomData })
    }
}

#[tracing::instrument(skip(incoming, outgoing, app_side))]
async fn drive_client_session(
    sid: u32,
    mut incoming: mpsc::UnboundedReceiver<Packet>,
    outgoing: mpsc::UnboundedSender<Packet>,
    mut app_side: DuplexStream,
) {
    let mut session = SessionCore::new(sid);
    let mut retransmit = time::interval_at(Instant::now() + RETRANSMIT_INTERVAL, RETRANSMIT_INTERVAL);
    let mut read_buf = [0_u8; 4096];

    loop {
        tokio::select! {
            packet = incoming.recv() => {
                let Some(packet) = packet else { break; };
                let effects = match packet {
                    Packet::Connect { .. } => session.handle_connect(),
                    Packet::Data { pos, data, .. } => session.handle_data(pos, data),
                    Packet::Ack { length, .. } => session.handle_ack(length),
                    Packet::Close { .. } => session.handle_close(),
                };

                for out in effects.send {
                    if outgoing.send(out).is_err() {
                        return;
                    }
                }

                if let Some(payload) = effects.delivered {
                    if app_side.write_all(&payload).await.is_err() {
                        return;
                    }
                }

                if effects.close {
                    debug!("client session {sid} closed by peer");
                    break;
                }
            }

            read = app_side.read(&mut read_buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for packet in session.queue_send(&read_buf[..n]) {
                            if outgoing.send(packet).is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            _ = retransmit.tick(), if session.needs_retransmit() => {
                for packet in session.retransmit() {
                    if outgoing.send(packet).is_err() {
                        warn!("client session {sid}: cannot retransmit, transport gone");
                        return;
                    }
                }
            }
        }
    }
}

impl<H> AsyncRead for Socket<H> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<H> AsyncWrite for Socket<H> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
