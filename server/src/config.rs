//! Server configuration shared by the binary and the tests

use crate::error::ServerError;
use shared::{DEFAULT_PORT, FALLBACK_PORT, MAX_FRAGMENT_LEN};
use std::path::PathBuf;
use std::time::Duration;

pub const OUTPUT_FILE_NAME: &str = "numbers.log";
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_BUFFER_SIZE: usize = MAX_FRAGMENT_LEN;

/// Runtime settings for a [`crate::network::Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// Preferred listening port
    pub port: u16,
    /// Port used when the preferred one cannot be bound
    pub fallback_port: u16,
    /// Cadence of the periodic summary
    pub report_interval: Duration,
    /// File receiving the unique tokens at shutdown
    pub output_path: PathBuf,
    /// Upper bound for a single socket read
    pub read_buffer_size: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fallback_address(&self) -> String {
        format!("{}:{}", self.host, self.fallback_port)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.host.trim().is_empty() {
            return Err(ServerError::InvalidConfig("host cannot be empty".into()));
        }
        if self.report_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "report interval must be greater than zero".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "read buffer size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            fallback_port: FALLBACK_PORT,
            report_interval: DEFAULT_REPORT_INTERVAL,
            output_path: default_output_path(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// `numbers.log` in the system temporary directory
pub fn default_output_path() -> PathBuf {
    std::env::temp_dir().join(OUTPUT_FILE_NAME)
}
