//! A revisioned text file store spoken over a small line-based
//! command protocol: `PUT`, `GET`, `LIST`, `HELP`.

pub mod protocol;
pub mod store;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;

use tracing::{error, info};

use protocol::SharedStore;
use store::Store;

/// # Errors
/// Propagates a fatal listener error.
pub async fn run(listener: TcpListener) -> std::io::Result<()> {
    let store: SharedStore = Arc::new(Mutex::new(Store::new()));

    loop {
        let (socket, peer) = listener.accept().await?;
        let store = Arc::clone(&store);

        info!(%peer, "accepted connection");

        tokio::spawn(async move {
            if let Err(err) = protocol::handler(socket, store).await {
                error!("connection error: {err}");
            }
        });
    }
}
