//! Sits between a client and a backend, passing lines through
//! unchanged except that any Boguscoin address appearing as its own
//! whitespace-delimited token is rewritten to ours before being
//! forwarded.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tracing::info;

const EVIL_ADDRESS: &str = "7YWHMfk9JZe0LM0g1ZauHuiSxhI";

/// A Boguscoin address: `7` followed by 25-34 further alphanumerics,
/// 26-35 characters total.
fn is_boguscoin_address(token: &str) -> bool {
    token.starts_with('7') && (26..=35).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn rewrite_line(line: &str) -> String {
    line.split(' ')
        .map(|token| if is_boguscoin_address(token) { EVIL_ADDRESS } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn pump(
    mut read: impl tokio::io::AsyncRead + Unpin,
    mut write: impl AsyncWriteExt + Unpin,
) -> Result<(), anyhow::Error> {
    let mut lines = BufReader::new(&mut read).lines();
    while let Some(line) = lines.next_line().await? {
        write.write_all(format!("{}\n", rewrite_line(&line)).as_bytes()).await?;
    }
    Ok(())
}

/// # Errors
/// Propagates any I/O error from either side of the proxy.
pub async fn handler(client: TcpStream, backend_addr: (String, u16)) -> Result<(), anyhow::Error> {
    let peer = client.peer_addr()?;
    info!(%peer, "connected");

    let backend = TcpStream::connect(backend_addr).await?;

    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    tokio::try_join!(pump(client_read, backend_write), pump(backend_read, client_write))?;

    info!(%peer, "disconnected");
    Ok(())
}
