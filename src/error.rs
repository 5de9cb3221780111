//! Unified error handling for the gateway.
//!
//! Domain failures never abort a session; the dispatcher converts them into
//! a `server_error` event for the originator and leaves all other state
//! untouched.

use thiserror::Error;
use ultra_proto::ErrorCode;

/// Errors raised while handling one inbound event.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("alias {0} is already in use")]
    AliasInUse(String),

    #[error("invalid alias: {0}")]
    AliasInvalid(String),

    #[error("no such channel: {0}")]
    ChannelNotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// The wire error code carried by the resulting `server_error`.
    #[inline]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::AliasInUse(_) => ErrorCode::AliasInUse,
            Self::AliasInvalid(_) => ErrorCode::AliasInvalid,
            Self::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::RateLimit => ErrorCode::RateLimit,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Static code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        self.code().as_str()
    }
}

/// Result type for event and command handlers.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Errors raised by the store's load and flush paths.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_codes() {
        assert_eq!(
            HandlerError::BadRequest("x".into()).error_code(),
            "BAD_REQUEST"
        );
        assert_eq!(HandlerError::RateLimit.error_code(), "RATE_LIMIT");
        assert_eq!(
            HandlerError::AliasInUse("Alpha".into()).code(),
            ErrorCode::AliasInUse
        );
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = HandlerError::AliasInUse("Alpha".into());
        assert_eq!(err.to_string(), "alias Alpha is already in use");
    }
}
