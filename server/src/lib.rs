//! # Number Dedup Server Library
//!
//! This library provides a TCP server that accepts any number of concurrent
//! clients, reads newline-delimited numeric tokens from each of them,
//! deduplicates the tokens across all clients and writes the unique ones to a
//! file when it stops.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! One task owns the listener, the connection registry and the dedup store.
//! It multiplexes new connections, data from existing connections and an
//! optional external shutdown signal with `tokio::select!`. Because it is the
//! only writer, none of that state needs a lock.
//!
//! ### Reader Tasks
//! Every accepted connection gets a small task that performs bounded reads and
//! forwards the raw bytes over a channel. Bytes from one connection therefore
//! reach the event loop in arrival order; nothing is guaranteed across
//! connections.
//!
//! ### Periodic Reporting
//! A background task samples the dedup counters on a fixed cadence and logs
//! how many unique and duplicate numbers arrived since the previous sample.
//! Counters are published as a pair through a `watch` channel, so a sample is
//! always consistent.
//!
//! ### Termination
//! The literal `terminate` from any client, or the external signal, moves the
//! server to `Terminating`. Shutdown then runs exactly once: all connections
//! are closed, the reporter is stopped and the unique tokens are written one
//! per line to the output file.
//!
//! ## Module Organization
//!
//! - `config`: server settings and their defaults
//! - `dedup`: the unique token set and duplicate counter
//! - `error`: server error type
//! - `network`: the `Server` and its event loop
//! - `persist`: writing the unique tokens at shutdown
//! - `registry`: live connections and their reader tasks
//! - `reporter`: the periodic summary task
//!
//! ## Known Limitations
//!
//! Reads are bounded and a partial token may only grow up to
//! [`shared::MAX_FRAGMENT_LEN`] bytes; a longer unterminated token drops the
//! connection. Tokens are compared as raw strings, so `007` and `7` are
//! distinct.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!
//!     // Runs until a client sends `terminate` or Ctrl+C is pressed
//!     let summary = server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     println!("{} unique numbers", summary.unique);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod network;
pub mod persist;
pub mod registry;
pub mod reporter;

pub use config::ServerConfig;
pub use error::ServerError;
pub use network::{Server, ShutdownSummary};
