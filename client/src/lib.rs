//! # Number Stream Client Library
//!
//! A scripted sender used to exercise the dedup server. It opens one TCP
//! connection, streams a bounded number of pseudo-random, zero-padded decimal
//! numbers (one per line), optionally pausing between them, and finally sends
//! the `terminate` keyword so the server shuts down and persists what it saw.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - `Client`: connection handling and random token generation
//! - `send_tokens`: the write loop, generic over any `AsyncWrite`
//! - `ClientError`: connection and I/O failures, with a dedicated variant for
//!   a refused connection so callers can report it without failing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(ClientConfig {
//!         count: 100,
//!         ..ClientConfig::default()
//!     });
//!     let summary = client.run().await?;
//!     println!("sent {}", summary.sent);
//!     Ok(())
//! }
//! ```

pub mod network;
