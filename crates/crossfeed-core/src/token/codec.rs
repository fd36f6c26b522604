///
/// Continuation codec helpers.
///
/// Owns the string form handed to callers between requests. Only JSON
/// framing lives here; token structure is decoded by the typed tokens.
///

use crate::{error::QueryError, value::Value};

/// Decode bound for untrusted continuation input.
pub const MAX_CONTINUATION_TOKEN_BYTES: usize = 64 * 1024;

///
/// TokenDecodeError
///

#[derive(Debug, Eq, thiserror::Error, PartialEq)]
pub enum TokenDecodeError {
    #[error("continuation token is empty")]
    Empty,

    #[error("continuation token exceeds max length: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("continuation token is not valid JSON: {message}")]
    InvalidJson { message: String },
}

impl From<TokenDecodeError> for QueryError {
    fn from(err: TokenDecodeError) -> Self {
        Self::malformed_token(err.to_string())
    }
}

/// Render a continuation as its compact JSON string.
#[must_use]
pub fn encode_continuation(value: &Value) -> String {
    value.to_string()
}

/// Parse a continuation string handed back by a caller.
///
/// Surrounding whitespace is trimmed.
pub fn decode_continuation(token: &str) -> Result<Value, TokenDecodeError> {
    let token = token.trim();

    if token.is_empty() {
        return Err(TokenDecodeError::Empty);
    }

    if token.len() > MAX_CONTINUATION_TOKEN_BYTES {
        return Err(TokenDecodeError::TooLong {
            len: token.len(),
            max: MAX_CONTINUATION_TOKEN_BYTES,
        });
    }

    serde_json::from_str(token).map_err(|err| TokenDecodeError::InvalidJson {
        message: err.to_string(),
    })
}
