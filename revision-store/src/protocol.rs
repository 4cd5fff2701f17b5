//! The line command protocol: `PUT`, `GET`, `LIST`, `HELP`, and the
//! maintenance-only `CLEAN-DATA`. Every reply is `\n`-terminated and
//! `READY` is re-sent before each command.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tracing::info;

use crate::store::Store;

pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("ERR illegal method: ")]
    MissingMethod,
    #[error("ERR illegal method: {0}")]
    UnknownMethod(String),
    #[error("ERR usage: PUT file length newline data")]
    BadPutUsage,
    #[error("ERR usage: GET file [revision]")]
    BadGetUsage,
    #[error("ERR usage: LIST dir")]
    BadListUsage,
    #[error("ERR illegal file name")]
    IllegalName,
    #[error("ERR no such revision")]
    NoSuchRevision,
    #[error("ERR no such file")]
    NoSuchFile,
    #[error("ERR text files only")]
    NotText,
}

fn validate_name(name: &str) -> Result<(), CommandError> {
    if name.is_empty() || !name.starts_with('/') {
        return Err(CommandError::IllegalName);
    }
    let rest = &name[1..];
    let valid_chars = rest.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if !valid_chars || rest.contains("//") {
        return Err(CommandError::IllegalName);
    }
    Ok(())
}

fn parse_revision(token: &str) -> Result<usize, CommandError> {
    let digits = token.strip_prefix('r').unwrap_or(token);
    digits.parse::<usize>().ok().filter(|&r| r >= 1).ok_or(CommandError::NoSuchRevision)
}

fn is_printable_text(data: &[u8]) -> bool {
    data.iter().all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7f).contains(&b))
}

/// Terminal outcome of one command: either the loop keeps going
/// (even after a recoverable `ERR`), or the connection is closed.
enum Outcome {
    Continue,
    Close,
}

async fn dispatch(
    store: &SharedStore,
    cmd: &str,
    tokens: &[&str],
    read: &mut (impl tokio::io::AsyncBufRead + Unpin),
    write: &mut (impl AsyncWriteExt + Unpin),
) -> Result<Outcome, anyhow::Error> {
    match cmd.to_ascii_lowercase().as_str() {
        "put" => match handle_put(store, tokens, read, write).await {
            Ok(()) => Ok(Outcome::Continue),
            Err(err) => {
                send(write, &err.to_string()).await?;
                Ok(Outcome::Continue)
            }
        },
        "get" => match handle_get(store, tokens, write).await {
            Ok(()) => Ok(Outcome::Continue),
            Err(err) => {
                send(write, &err.to_string()).await?;
                Ok(Outcome::Continue)
            }
        },
        "list" => match handle_list(store, tokens, write).await {
            Ok(()) => Ok(Outcome::Continue),
            Err(err) => {
                send(write, &err.to_string()).await?;
                Ok(Outcome::Continue)
            }
        },
        "help" => {
            send(write, "OK usage: HELP|GET|PUT|LIST").await?;
            Ok(Outcome::Continue)
        }
        "clean-data" => {
            store.lock().clear();
            Ok(Outcome::Continue)
        }
        other => {
            send(write, &CommandError::UnknownMethod(other.to_string()).to_string()).await?;
            Ok(Outcome::Close)
        }
    }
}

async fn handle_put(
    store: &SharedStore,
    tokens: &[&str],
    read: &mut (impl tokio::io::AsyncBufRead + Unpin),
    write: &mut (impl AsyncWriteExt + Unpin),
) -> Result<(), CommandError> {
    let [name, len_str] = tokens else { return Err(CommandError::BadPutUsage) };
    validate_name(name)?;
    let len: usize = len_str.parse().map_err(|_| CommandError::BadPutUsage)?;

    let mut data = vec![0u8; len];
    read.read_exact(&mut data).await.map_err(|_| CommandError::BadPutUsage)?;

    if !is_printable_text(&data) {
        return Err(CommandError::NotText);
    }

    let revision = store.lock().put(name, data);
    send(write, &format!("OK r{revision}")).await.map_err(|_| CommandError::BadPutUsage)?;
    Ok(())
}

async fn handle_get(
    store: &SharedStore,
    tokens: &[&str],
    write: &mut (impl AsyncWriteExt + Unpin),
) -> Result<(), CommandError> {
    if tokens.is_empty() || tokens.len() > 2 {
        return Err(CommandError::BadGetUsage);
    }
    let name = tokens[0];
    validate_name(name)?;

    let revision = tokens.get(1).map(|t| parse_revision(t)).transpose()?;

    let data = {
        let store = store.lock();
        store.get(name, revision).map(<[u8]>::to_vec)
    };

    match data {
        Some(data) => {
            send(write, &format!("OK {}", data.len())).await.map_err(|_| CommandError::BadGetUsage)?;
            write.write_all(&data).await.map_err(|_| CommandError::BadGetUsage)?;
            Ok(())
        }
        None if revision.is_some() => Err(CommandError::NoSuchRevision),
        None => Err(CommandError::NoSuchFile),
    }
}

async fn handle_list(
    store: &SharedStore,
    tokens: &[&str],
    write: &mut (impl AsyncWriteExt + Unpin),
) -> Result<(), CommandError> {
    let [dir] = tokens else { return Err(CommandError::BadListUsage) };
    validate_name(dir)?;

    let dir = if dir.ends_with('/') { (*dir).to_string() } else { format!("{dir}/") };
    let (dirs, files) = store.lock().list(&dir);

    send(write, &format!("OK {}", dirs.len() + files.len())).await.map_err(|_| CommandError::BadListUsage)?;
    for d in &dirs {
        send(write, &format!("{d} DIR")).await.map_err(|_| CommandError::BadListUsage)?;
    }
    for (name, revision) in &files {
        send(write, &format!("{name} r{revision}")).await.map_err(|_| CommandError::BadListUsage)?;
    }
    Ok(())
}

async fn send(write: &mut (impl AsyncWriteExt + Unpin), msg: &str) -> std::io::Result<()> {
    write.write_all(format!("{msg}\n").as_bytes()).await
}

/// # Errors
/// Propagates any I/O error from the socket.
pub async fn handler(socket: TcpStream, store: SharedStore) -> Result<(), anyhow::Error> {
    let peer = socket.peer_addr()?;
    info!(%peer, "connected");

    let (read_half, mut write_half) = socket.into_split();
    let mut read = BufReader::new(read_half);

    loop {
        send(&mut write_half, "READY").await?;

        let mut line = String::new();
        let n = read.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let mut tokens = line.trim_end().split_whitespace();
        let Some(cmd) = tokens.next() else {
            send(&mut write_half, &CommandError::MissingMethod.to_string()).await?;
            break;
        };
        let tokens: Vec<&str> = tokens.collect();

        match dispatch(&store, cmd, &tokens, &mut read, &mut write_half).await? {
            Outcome::Continue => {}
            Outcome::Close => break,
        }
    }

    info!(%peer, "disconnected");
    Ok(())
}
