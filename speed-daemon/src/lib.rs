//! Speed Daemon: cameras report license plate sightings, the server
//! works out average speeds between pairs of cameras on the same
//! road, and dispatchers are sent a ticket for any car caught
//! averaging more than half a mile per hour over the road's limit.
//!
//! A connection identifies itself as exactly one of a camera or a
//! dispatcher and keeps that role for its lifetime; see
//! [`connection::handle_connection`] for the per-connection state
//! machine and [`shared::Shared`] for the state it all funnels
//! through.

pub mod connection;
pub mod dispatch;
pub mod heartbeat;
pub mod shared;
pub mod store;
pub mod ticketing;
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;

use tracing::info;

use shared::Shared;

/// Accepts connections on `listener` until the process is asked to
/// stop, spawning one task per connection.
///
/// # Errors
/// Propagates a fatal listener error.
pub async fn run(listener: TcpListener) -> std::io::Result<()> {
    let shared = Arc::new(Mutex::new(Shared::new()));
    let next_conn_id = AtomicU64::new(0);

    loop {
        let (stream, peer) = listener.accept().await?;
        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&shared);

        info!(conn_id, %peer, "accepted connection");

        tokio::spawn(async move {
            connection::handle_connection(conn_id, stream, shared).await;
        });
    }
}
