pub mod codec;

pub use codec::{CodecError, LineDecoder, Tokens};

pub const DEFAULT_PORT: u16 = 4000;
pub const FALLBACK_PORT: u16 = 4001;
pub const TERMINATE_KEYWORD: &str = "terminate";
pub const TOKEN_WIDTH: usize = 9;
pub const MAX_TOKEN_VALUE: u32 = 999_999_999;
pub const MAX_FRAGMENT_LEN: usize = 64;

/// Formats a value as a zero-padded, newline-terminated token.
pub fn encode_token(value: u32) -> String {
    format!("{:0width$}\n", value, width = TOKEN_WIDTH)
}

pub fn is_terminate(fragment: &[u8]) -> bool {
    fragment == TERMINATE_KEYWORD.as_bytes()
}
