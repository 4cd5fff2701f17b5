//! Every connection picks an alphanumeric name on joining, is told
//! who else is in the room, and from then on every line it sends is
//! broadcast to everyone else prefixed with `[name]`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("name already taken")]
    Duplicate,
    #[error("invalid name")]
    Invalid,
}

pub type Room = Arc<Mutex<HashMap<String, UnboundedSender<String>>>>;

fn validate_name(name: &str) -> Result<(), JoinError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(JoinError::Invalid);
    }
    Ok(())
}

struct Guard {
    room: Room,
    name: String,
}

impl Guard {
    fn broadcast(&self, msg: &str) {
        let room = self.room.lock();
        for (name, sender) in room.iter() {
            if *name != self.name {
                let _ = sender.send(msg.to_string());
            }
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.room.lock().remove(&self.name);
        self.broadcast(&format!("* {} has left the room\n", self.name));
    }
}

/// # Errors
/// Propagates any I/O error from the socket.
pub async fn handler(socket: TcpStream, room: Room) -> Result<(), anyhow::Error> {
    let peer = socket.peer_addr()?;
    info!(%peer, "connected");

    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"Welcome to budgetchat! What shall I call you?\n").await?;

    let Some(name) = lines.next_line().await? else { return Ok(()) };
    if validate_name(&name).is_err() || room.lock().contains_key(&name) {
        write.write_all(b"* invalid name\n").await?;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    {
        let existing: Vec<String> = room.lock().keys().cloned().collect();
        write.write_all(format!("* room contains: {}\n", existing.join(", ")).as_bytes()).await?;
    }

    let guard = Guard { room: Arc::clone(&room), name: name.clone() };
    guard.broadcast(&format!("* {name} has entered the room\n"));
    room.lock().insert(name.clone(), tx);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => guard.broadcast(&format!("[{name}] {line}\n")),
                    None => break,
                }
            }
            Some(msg) = rx.recv() => {
                write.write_all(msg.as_bytes()).await?;
            }
        }
    }

    info!(%peer, "disconnected");
    Ok(())
}
