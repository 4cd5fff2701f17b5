//! A single key-value store reachable over UDP. A datagram containing
//! `=` is an insert (`key=value`, first `=` only); anything else is a
//! query, answered with `key=value` (empty value if unknown). The key
//! `version` is reserved and always answers with the server's
//! version string, never overwritable.

use std::collections::HashMap;

use tokio::net::UdpSocket;

use tracing::{debug, error};

const VERSION: &str = "kv-store-udp v1.0";
const MAX_DATAGRAM: usize = 1000;

fn parse(msg: &str) -> (&str, &str, bool) {
    msg.find('=').map_or((msg, "", false), |i| (&msg[..i], &msg[i + 1..], true))
}

/// # Errors
/// Propagates a fatal socket error.
pub async fn run(socket: UdpSocket) -> std::io::Result<()> {
    let mut store: HashMap<String, String> = HashMap::new();
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let Ok(msg) = std::str::from_utf8(&buf[..len]) else {
            error!(%peer, "non-utf8 datagram");
            continue;
        };

        debug!(%peer, msg, "received");

        let (key, value, is_insert) = parse(msg);

        let reply = if key == "version" {
            format!("version={VERSION}")
        } else if is_insert {
            store.insert(key.to_string(), value.to_string());
            continue;
        } else {
            format!("{key}={}", store.get(key).map_or("", String::as_str))
        };

        if reply.len() > MAX_DATAGRAM {
            error!(%peer, "reply too large, dropping");
            continue;
        }

        socket.send_to(reply.as_bytes(), peer).await?;
    }
}
