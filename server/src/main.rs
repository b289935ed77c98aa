use clap::Parser;
use log::{error, info};
use server::config::{default_output_path, ServerConfig};
use server::network::Server;
use shared::{DEFAULT_PORT, FALLBACK_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Listens for numbers on a port and writes the unique ones to a file")]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port where the server will be listening
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Port used when the main one is already in use
    #[arg(long, default_value_t = FALLBACK_PORT)]
    fallback_port: u16,

    /// Seconds between summary reports
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    report_interval: u64,

    /// File receiving the unique numbers (defaults to numbers.log in the temp dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum bytes per socket read
    #[arg(long, default_value = "64")]
    read_buffer: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        fallback_port: args.fallback_port,
        report_interval: Duration::from_secs(args.report_interval),
        output_path: args.output.unwrap_or_else(default_output_path),
        read_buffer_size: args.read_buffer,
    };

    let mut server = Server::new(config).await?;

    let summary = server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => {
                    error!("Unable to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    match summary.persisted {
        Some(path) => info!(
            "Done: {} unique numbers written to {}",
            summary.unique,
            path.display()
        ),
        None => info!("Done: {} unique numbers (not persisted)", summary.unique),
    }

    Ok(())
}
