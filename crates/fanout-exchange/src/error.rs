//! Exchange access error types.

use thiserror::Error;

/// OKX code for "too many requests".
const CODE_RATE_LIMITED: &str = "50011";

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport failure: connect, timeout, TLS, body read.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response envelope carried a non-success code.
    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Response was well-formed JSON but missing required data.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExchangeError {
    /// Whether an idempotent read may be retried after this error.
    ///
    /// Never consulted for leverage or order submission.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpClient(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Api { code, .. } => code == CODE_RATE_LIMITED,
            Self::UnknownInstrument(_)
            | Self::MalformedResponse(_)
            | Self::Signing(_)
            | Self::Json(_) => false,
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ExchangeError::HttpClient("timeout".into()).is_retryable());
        assert!(ExchangeError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(ExchangeError::HttpStatus { status: 429, body: String::new() }.is_retryable());
        assert!(!ExchangeError::HttpStatus { status: 401, body: String::new() }.is_retryable());
        assert!(ExchangeError::Api { code: "50011".into(), msg: String::new() }.is_retryable());
        assert!(!ExchangeError::Api { code: "51000".into(), msg: String::new() }.is_retryable());
        assert!(!ExchangeError::UnknownInstrument("X".into()).is_retryable());
        assert!(!ExchangeError::MalformedResponse("x".into()).is_retryable());
    }
}
