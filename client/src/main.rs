use clap::Parser;
use client::network::{Client, ClientConfig, ClientError};
use log::{info, warn};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:4000")]
    server: String,

    /// Number of random numbers to send
    #[arg(short = 'c', long, default_value = "10")]
    count: usize,

    /// Pause after each number in milliseconds
    #[arg(short = 'i', long, default_value = "0")]
    interval_ms: u64,

    /// Do not send the termination keyword at the end
    #[arg(long)]
    no_terminate: bool,

    /// Seed for reproducible numbers
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(ClientConfig {
        server_addr: args.server,
        count: args.count,
        interval: Duration::from_millis(args.interval_ms),
        send_terminate: !args.no_terminate,
        seed: args.seed,
    });

    match client.run().await {
        Ok(summary) => {
            info!(
                "Sent {} numbers{}",
                summary.sent,
                if summary.terminated { " and the termination keyword" } else { "" }
            );
            Ok(())
        }
        Err(ClientError::ConnectionRefused { addr }) => {
            warn!("Connection to {} refused", addr);
            println!("Client terminated");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
