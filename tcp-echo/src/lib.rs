//! Echoes every byte read on a connection back to it, unchanged.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use tracing::info;

/// # Errors
/// Propagates any I/O error from the socket.
pub async fn echo(mut socket: TcpStream) -> Result<(), anyhow::Error> {
    let peer = socket.peer_addr()?;
    info!(%peer, "connected");

    let (mut read, mut write) = socket.split();
    tokio::io::copy(&mut read, &mut write).await?;
    write.shutdown().await?;

    info!(%peer, "disconnected");
    Ok(())
}
