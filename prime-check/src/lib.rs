//! One JSON request per line: `{"method":"isPrime","number":N}`,
//! answered with `{"method":"isPrime","prime":bool}`. Anything else
//! gets a malformed-request error and the connection is closed.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    number: serde_json::Number,
}

#[derive(Debug, Serialize)]
struct Response {
    method: &'static str,
    prime: bool,
}

fn parse_request(line: &str) -> Result<Request, RequestError> {
    let req: Request = serde_json::from_str(line)?;
    if req.method != "isPrime" {
        return Err(RequestError::UnsupportedMethod(req.method));
    }
    Ok(req)
}

/// A non-integer number is truncated toward zero before the
/// primality check, same as the reference implementation.
fn is_prime(number: &serde_json::Number) -> bool {
    let n = number.as_i64().or_else(|| number.as_f64().map(|f| f as i64));
    match n {
        Some(n) if n >= 2 => primes::is_prime(n as u64),
        _ => false,
    }
}

/// # Errors
/// Propagates any I/O error from the socket.
pub async fn handler(socket: TcpStream) -> Result<(), anyhow::Error> {
    let peer = socket.peer_addr()?;
    info!(%peer, "connected");

    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        debug!(%peer, line, "request");

        match parse_request(&line) {
            Ok(req) => {
                let response = Response { method: "isPrime", prime: is_prime(&req.number) };
                let mut payload = serde_json::to_vec(&response)?;
                payload.push(b'\n');
                write.write_all(&payload).await?;
            }
            Err(err) => {
                let payload = serde_json::json!({ "method": "error", "error": err.to_string() });
                write.write_all(format!("{payload}\n").as_bytes()).await?;
                break;
            }
        }
    }

    info!(%peer, "disconnected");
    Ok(())
}
