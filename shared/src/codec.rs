//! Newline-delimited token framing.
//!
//! Bytes are split on `\n` before any UTF-8 decoding happens, so a multi-byte
//! character that straddles two reads is reassembled in the pending fragment
//! instead of surfacing as a decode error.

use crate::MAX_FRAGMENT_LEN;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("token is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("unterminated token of {len} bytes exceeds the {max} byte limit")]
    TokenTooLong { len: usize, max: usize },
}

/// Per-connection decoder that keeps the trailing partial token between reads.
#[derive(Debug)]
pub struct LineDecoder {
    pending: Vec<u8>,
    max_fragment_len: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_max_fragment_len(MAX_FRAGMENT_LEN)
    }

    pub fn with_max_fragment_len(max_fragment_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_fragment_len,
        }
    }

    /// Feeds a raw chunk and returns the complete tokens it closes.
    ///
    /// Framing is done eagerly so the pending fragment is up to date as soon as
    /// this returns; UTF-8 decoding of each token happens lazily as the returned
    /// iterator is consumed. Empty lines are skipped and a trailing `\r` is
    /// dropped. If the pending fragment outgrows the limit, the iterator yields
    /// `TokenTooLong` after the complete tokens and the fragment is discarded.
    pub fn decode(&mut self, chunk: &[u8]) -> Tokens {
        self.pending.extend_from_slice(chunk);

        let complete = match self.pending.iter().rposition(|&b| b == b'\n') {
            Some(idx) => {
                let rest = self.pending.split_off(idx + 1);
                std::mem::replace(&mut self.pending, rest)
            }
            None => Vec::new(),
        };

        let overflow = if self.pending.len() > self.max_fragment_len {
            let len = self.pending.len();
            self.pending.clear();
            Some(CodecError::TokenTooLong {
                len,
                max: self.max_fragment_len,
            })
        } else {
            None
        };

        Tokens {
            complete,
            pos: 0,
            overflow,
        }
    }

    /// Drains the pending fragment as a final token, used once the peer closed.
    pub fn finish(&mut self) -> Option<Result<String, CodecError>> {
        let fragment = std::mem::take(&mut self.pending);
        let fragment = trim_line(&fragment);
        if fragment.is_empty() {
            None
        } else {
            Some(decode_token(fragment))
        }
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Pending fragment as it would be decoded by [`LineDecoder::finish`]
    pub fn pending_token(&self) -> &[u8] {
        trim_line(&self.pending)
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete tokens produced by a single [`LineDecoder::decode`] call.
#[derive(Debug)]
pub struct Tokens {
    complete: Vec<u8>,
    pos: usize,
    overflow: Option<CodecError>,
}

impl Iterator for Tokens {
    type Item = Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.complete.len() {
            let rest = &self.complete[self.pos..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(rest.len());
            self.pos += end + 1;

            let line = trim_line(&rest[..end]);
            if line.is_empty() {
                continue;
            }
            return Some(decode_token(line));
        }

        self.overflow.take().map(Err)
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn decode_token(line: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|e| CodecError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })
}
