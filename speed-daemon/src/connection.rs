//! Per-connection role negotiation and message dispatch (§4.4, §4.6).

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use tracing::{debug, info, warn};

use crate::heartbeat::{deciseconds_to_duration, Heartbeat};
use crate::shared::Shared;
use crate::wire::{ClientMessage, MessageCodec, ServerMessage};

#[derive(Debug, Default)]
enum Role {
    #[default]
    Unidentified,
    Camera {
        road: u16,
        mile: u16,
        limit: u16,
    },
    Dispatcher,
}

/// Drives one client connection until it disconnects or breaks a rule
/// of the protocol, at which point an `Error` message is sent (where
/// possible) and the connection is torn down.
#[tracing::instrument(skip(stream, shared), fields(conn_id))]
pub async fn handle_connection(conn_id: u64, stream: TcpStream, shared: Arc<Mutex<Shared>>) {
    let mut framed = Framed::new(stream, MessageCodec);
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut role = Role::Unidentified;
    let mut heartbeat = Heartbeat::new();

    let result: anyhow::Result<()> = loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        if let Err(err) = handle_message(conn_id, msg, &mut role, &mut heartbeat, &shared, &outgoing_tx) {
                            let _ = framed.send(ServerMessage::Error { message: err.to_string() }).await;
                            break Err(err);
                        }
                    }
                    Some(Err(err)) => break Err(err.into()),
                    None => break Ok(()),
                }
            }

            Some(msg) = outgoing_rx.recv() => {
                if let Err(err) = framed.send(msg).await {
                    break Err(err.into());
                }
            }

            () = heartbeat.tick() => {
                if let Err(err) = framed.send(ServerMessage::Heartbeat).await {
                    break Err(err.into());
                }
            }
        }
    };

    if let Role::Dispatcher = role {
        shared.lock().dispatch.unregister(conn_id);
    }

    match result {
        Ok(()) => info!("connection closed"),
        Err(err) => warn!("connection closed with error: {err}"),
    }
}

fn handle_message(
    conn_id: u64,
    msg: ClientMessage,
    role: &mut Role,
    heartbeat: &mut Heartbeat,
    shared: &Arc<Mutex<Shared>>,
    outgoing_tx: &mpsc::UnboundedSender<ServerMessage>,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::WantHeartbeat { interval } => {
            if heartbeat.already_requested() {
                anyhow::bail!("multiple WantHeartbeat messages on one connection");
            }
            heartbeat.set_period(deciseconds_to_duration(interval));
            Ok(())
        }

        ClientMessage::IAmCamera { road, mile, limit } => {
            if !matches!(role, Role::Unidentified) {
                anyhow::bail!("IAmCamera sent after the connection already identified itself");
            }
            debug!(road, mile, limit, "camera identified");
            *role = Role::Camera { road, mile, limit };
            Ok(())
        }

        ClientMessage::IAmDispatcher { roads } => {
            if !matches!(role, Role::Unidentified) {
                anyhow::bail!("IAmDispatcher sent after the connection already identified itself");
            }
            debug!(?roads, "dispatcher identified");
            *role = Role::Dispatcher;
            shared.lock().dispatch.register(conn_id, &roads, outgoing_tx.clone());
            Ok(())
        }

        ClientMessage::Plate { plate, timestamp } => {
            let Role::Camera { road, mile, limit } = *role else {
                anyhow::bail!("Plate sent by a connection that has not identified as a camera");
            };

            let mut shared = shared.lock();
            shared.observations.record(&plate, road, mile, timestamp);
            let history = shared.observations.history(&plate, road).to_vec();
            let tickets = shared.tickets.evaluate(&plate, road, limit, &history);
            for ticket in tickets {
                shared.dispatch.enqueue(ticket);
            }
            Ok(())
        }
    }
}
