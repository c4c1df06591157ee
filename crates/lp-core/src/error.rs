//! Typed error definitions for the quote subscriber.
//!
//! [`LpError`] is returned at crate boundaries. The runner wraps it in
//! `anyhow::Error` with extra context.

use thiserror::Error;

use crate::types::SymbolError;

/// Convenience alias used by the library crates.
pub type LpResult<T> = Result<T, LpError>;

/// Domain-specific errors for the quote subscriber.
#[derive(Debug, Error)]
pub enum LpError {
    /// Missing or malformed configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// A symbol could not be normalized.
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    /// HTTP transport failure or unexpected HTTP status.
    #[error("http error: {0}")]
    Http(String),

    /// The server rejected our credentials or one-time token.
    #[error("auth error: {0}")]
    Auth(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered a request with a non-zero code.
    #[error("request failed (code {code}): {message}")]
    Request { code: i64, message: String },

    /// No response arrived within the request timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The quote context was closed or its session task has exited.
    #[error("quote context closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for LpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

impl From<serde_json::Error> for LpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
