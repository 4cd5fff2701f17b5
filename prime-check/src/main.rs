use std::net::IpAddr;

use clap::Parser;
use tokio::net::TcpListener;

use tracing::error;

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

    let listener = TcpListener::bind((args.address, args.port)).await?;
    loop {
        let (socket, _) = listener.accept().await?;

        tokio::spawn(async move {
            if let Err(err) = prime_check::handler(socket).await {
                error!("connection error: {err}");
            }
        });
    }
}
