//! Gateway error taxonomy shared between endpoints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes carried by `server_error` events.
///
/// Every domain failure the gateway reports to a client maps to exactly one
/// of these codes; the accompanying message is free-form and human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[error("bad request")]
    BadRequest,

    #[error("unauthorized")]
    Unauthorized,

    #[error("alias in use")]
    AliasInUse,

    #[error("alias invalid")]
    AliasInvalid,

    #[error("channel not found")]
    ChannelNotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("internal error")]
    Internal,
}

impl ErrorCode {
    /// The wire spelling of the code, as serialized into `server_error`.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AliasInUse => "ALIAS_IN_USE",
            Self::AliasInvalid => "ALIAS_INVALID",
            Self::ChannelNotFound => "CHANNEL_NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimit => "RATE_LIMIT",
            Self::Internal => "INTERNAL",
        }
    }
}
