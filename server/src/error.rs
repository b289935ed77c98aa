use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can stop the server or a shutdown step.
///
/// Per-connection failures (decode errors, read errors) never surface here;
/// they are logged and the connection is dropped.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
