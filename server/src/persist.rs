//! Dump of the unique tokens at shutdown

use crate::error::ServerError;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Writes one token per line, truncating any previous content.
///
/// Returns the number of tokens written.
pub async fn persist_tokens<'a, I>(path: &Path, tokens: I) -> Result<usize, ServerError>
where
    I: IntoIterator<Item = &'a str>,
{
    let file = File::create(path)
        .await
        .map_err(|e| persist_error(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    for token in tokens {
        writer
            .write_all(token.as_bytes())
            .await
            .map_err(|e| persist_error(path, e))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| persist_error(path, e))?;
        written += 1;
    }

    writer.flush().await.map_err(|e| persist_error(path, e))?;
    Ok(written)
}

fn persist_error(path: &Path, source: io::Error) -> ServerError {
    ServerError::Persist {
        path: path.to_path_buf(),
        source,
    }
}
