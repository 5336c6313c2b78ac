//! Error types for feed operations.
//!
//! This module defines [`FeedError`] which covers every failure an adapter can
//! surface to a caller: payload validation, credential rejection, throttling,
//! HTTP and transport failures, empty results and missing environments.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching, validating or streaming market data.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The payload did not match the canonical shape. Always fatal to the call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider rejected the configured credential.
    #[error("Authentication failed for provider {provider}: {message}")]
    Auth {
        /// The provider that rejected the credential.
        provider: String,
        /// Upstream message, if any.
        message: String,
    },

    /// The request was throttled, either by the remote server or locally.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that throttled the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Non-success HTTP status, or an error body returned with a success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Upstream message or body excerpt.
        message: String,
    },

    /// Network-level failure (connect, timeout, broken stream).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request was well-formed but the provider returned no rows.
    #[error("No data for {symbol} ({range})")]
    NoData {
        /// The symbol that was requested.
        symbol: String,
        /// The requested range or data kind.
        range: String,
    },

    /// The provider cannot be used in this environment (missing bridge or credential).
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// No provider is registered under the requested id.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider does not implement the requested operation.
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl FeedError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true when retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using [`FeedError`].
pub type Result<T> = std::result::Result<T, FeedError>;
