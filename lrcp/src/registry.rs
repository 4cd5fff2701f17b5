//! Server-side session registry: the single actor that owns every live
//! LRCP session, demultiplexes inbound datagrams onto them, and reaps
//! idle or closed ones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use tracing::{debug, info, warn};

use crate::lrcp::packets::{Packet, SyncWrite};
use crate::session::SessionCore;
use crate::SocketHandler;

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(3);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Datagrams larger than this are never legal LRCP frames; read into a
/// buffer with headroom so an oversize inbound datagram is dropped by
/// [`Packet::try_from`] rather than silently truncated by the socket.
const RECV_BUFFER: usize = 2048;

enum Event {
    Inbound(Packet, SocketAddr),
    Retransmit(u32),
}

struct ServerSession<H> {
    core: SessionCore,
    app: H,
    peer: SocketAddr,
    last_rx: Instant,
    retransmit_task: JoinHandle<()>,
}

/// Runs the LRCP server loop until the socket or its reader task dies.
///
/// # Errors
/// Propagates a bind-time or fatal socket error; per-datagram errors are
/// logged and do not stop the server.
pub async fn run<H: SocketHandler>(socket: UdpSocket) -> std::io::Result<()> {
    let socket = Arc::new(socket);
    let mut sessions: HashMap<u32, ServerSession<H>> = HashMap::new();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    tokio::spawn(read_datagrams(socket.clone(), event_tx.clone()));

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(Event::Inbound(packet, addr)) => {
                        handle_inbound(&socket, &mut sessions, &event_tx, packet, addr).await;
                    }
                    Some(Event::Retransmit(sid)) => {
                        if let Some(session) = sessions.get_mut(&sid) {
                            if session.core.needs_retransmit() {
                                debug!("retransmitting session {sid}");
                                send_all(&socket, session.peer, session.core.retransmit()).await;
                            }
                        }
                    }
                    None => break,
                }
            }

            _ = sweep.tick() => {
                reap_sessions(&mut sessions);
            }
        }
    }

    Ok(())
}

async fn read_datagrams(socket: Arc<UdpSocket>, event_tx: mpsc::UnboundedSender<Event>) {
    let mut buf = [0_u8; RECV_BUFFER];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => match Packet::try_from(&buf[..len]) {
                Ok(packet) => {
                    if event_tx.send(Event::Inbound(packet, addr)).is_err() {
                        break;
                    }
                }
                Err(err) => debug!("dropping malformed datagram from {addr}: {err}"),
            },
            Err(err) => warn!("recv error: {err}"),
        }
    }
}

fn reap_sessions<H>(sessions: &mut HashMap<u32, ServerSession<H>>) {
    let now = Instant::now();
    let expired: Vec<u32> = sessions
        .iter()
        .filter(|(_, s)| s.core.is_closed() || now.duration_since(s.last_rx) > IDLE_TIMEOUT)
        .map(|(sid, _)| *sid)
        .collect();

    for sid in expired {
        if let Some(session) = sessions.remove(&sid) {
            info!("reaping session {sid}");
            session.retransmit_task.abort();
        }
    }
}

async fn handle_inbound<H: SocketHandler>(
    socket: &UdpSocket,
    sessions: &mut HashMap<u32, ServerSession<H>>,
    event_tx: &mpsc::UnboundedSender<Event>,
    packet: Packet,
    addr: SocketAddr,
) {
    let sid = packet.session();

    if !sessions.contains_key(&sid) {
        if !matches!(packet, Packet::Connect { .. }) {
            debug!("frame for unknown session {sid}, refusing");
            send_all(socket, addr, vec![Packet::Close { session: sid }]).await;
            return;
        }

        info!("new session {sid} from {addr}");
        let retransmit_task = spawn_retransmit_timer(sid, event_tx.clone());
        sessions.insert(
            sid,
            ServerSession {
                core: SessionCore::new(sid),
                app: H::default(),
                peer: addr,
                last_rx: Instant::now(),
                retransmit_task,
            },
        );
    }

    let session = sessions.get_mut(&sid).expect("just inserted or already present");
    session.peer = addr;
    session.last_rx = Instant::now();

    let effects = match packet {
        Packet::Connect { .. } => session.core.handle_connect(),
        Packet::Data { pos, data, .. } => session.core.handle_data(pos, data),
        Packet::Ack { length, .. } => session.core.handle_ack(length),
        Packet::Close { .. } => session.core.handle_close(),
    };

    send_all(socket, session.peer, effects.send).await;

    if let Some(payload) = effects.delivered {
        let output = session.app.process(&payload);
        if !output.is_empty() {
            let packets = session.core.queue_send(&output);
            send_all(socket, session.peer, packets).await;
        }
    }

    if effects.close {
        if let Some(session) = sessions.remove(&sid) {
            session.retransmit_task.abort();
        }
    }
}

fn spawn_retransmit_timer(sid: u32, event_tx: mpsc::UnboundedSender<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + RETRANSMIT_INTERVAL,
            RETRANSMIT_INTERVAL,
        );
        loop {
            ticker.tick().await;
            if event_tx.send(Event::Retransmit(sid)).is_err() {
                break;
            }
        }
    })
}

async fn send_all(socket: &UdpSocket, addr: SocketAddr, packets: Vec<Packet>) {
    for packet in packets {
        let mut buf = Vec::new();
        if let Err(err) = buf.write_value(&packet) {
            warn!("failed to encode outbound frame: {err}");
            continue;
        }
        if let Err(err) = socket.send_to(&buf, addr).await {
            warn!("send_to {addr} failed: {err}");
        }
    }
}
