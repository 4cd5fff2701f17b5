//! Each connection speaks a stream of fixed 9-byte records: one
//! tagged byte, then two big-endian `i32`s. `I timestamp price`
//! inserts a price; `Q mintime maxtime` answers with the mean price
//! (as an `i32`) of every insert whose timestamp falls in
//! `[mintime, maxtime]`, 0 if none match.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tracing::{debug, info};

const RECORD_LEN: usize = 9;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown record tag: {0:#04x}")]
    UnknownTag(u8),
}

#[derive(Debug)]
enum Record {
    Insert { timestamp: i32, price: i32 },
    Query { mintime: i32, maxtime: i32 },
}

fn parse_record(buf: &[u8; RECORD_LEN]) -> Result<Record, RecordError> {
    let a = i32::from_be_bytes(buf[1..5].try_into().unwrap());
    let b = i32::from_be_bytes(buf[5..9].try_into().unwrap());

    match buf[0] {
        b'I' => Ok(Record::Insert { timestamp: a, price: b }),
        b'Q' => Ok(Record::Query { mintime: a, maxtime: b }),
        other => Err(RecordError::UnknownTag(other)),
    }
}

fn mean(prices: &[i32]) -> i32 {
    if prices.is_empty() {
        return 0;
    }
    let sum: i64 = prices.iter().map(|&p| i64::from(p)).sum();
    (sum / prices.len() as i64) as i32
}

/// # Errors
/// Propagates any I/O error from the socket. An unknown record tag
/// ends the connection without a reply, matching a client that has
/// desynchronized from the framing.
pub async fn handler(mut socket: TcpStream) -> Result<(), anyhow::Error> {
    let peer = socket.peer_addr()?;
    info!(%peer, "connected");

    let mut records: Vec<(i32, i32)> = Vec::new();
    let mut buf = [0u8; RECORD_LEN];

    loop {
        if let Err(err) = socket.read_exact(&mut buf).await {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                break;
            }
            return Err(err.into());
        }

        match parse_record(&buf)? {
            Record::Insert { timestamp, price } => {
                debug!(%peer, timestamp, price, "insert");
                records.push((timestamp, price));
            }
            Record::Query { mintime, maxtime } => {
                let matching: Vec<i32> = records
                    .iter()
                    .filter(|&&(ts, _)| ts >= mintime && ts <= maxtime)
                    .map(|&(_, price)| price)
                    .collect();
                let result = mean(&matching);
                debug!(%peer, mintime, maxtime, result, "query");
                socket.write_all(&result.to_be_bytes()).await?;
            }
        }
    }

    info!(%peer, "disconnected");
    Ok(())
}
