use std::net::IpAddr;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::UdpSocket;

use tracing::{error, info};

use lrcp::{run, DefaultSocketHandler};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, env = "SOCKET_ADDRESS", default_value = "0.0.0.0")]
    address: IpAddr,

    #[arg(long, env = "UDP_PORT", default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let socket = match UdpSocket::bind((args.address, args.port)).await {
        Ok(socket) => socket,
        Err(err) => {
            error!("failed to bind {}:{}: {err}", args.address, args.port);
            return ExitCode::FAILURE;
        }
    };

    info!("listening on {}:{}", args.address, args.port);

    tokio::select! {
        result = run::<DefaultSocketHandler>(socket) => {
            if let Err(err) = result {
                error!("server exited with error: {err}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
    }

    ExitCode::SUCCESS
}
