use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use tracing::error;

use line_chat::Room;

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, env = "SOCKET_ADDRESS", default_value = "0.0.0.0")]
    address: IpAddr,

    #[arg(long, env = "TCP_PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let room: Room = Arc::new(Mutex::new(std::collections::HashMap::new()));

    let listener = TcpListener::bind((args.address, args.port)).await?;
    loop {
        let (socket, _) = listener.accept().await?;
        let room = Arc::clone(&room);

        tokio::spawn(async move {
            if let Err(err) = line_chat::handler(socket, room).await {
                error!("connection error: {err}");
            }
        });
    }
}
