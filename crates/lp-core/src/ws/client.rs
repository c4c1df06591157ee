//! WebSocket connection establishment and reconnect pacing.
//!
//! The quote session owns its read/write loop (it has to run an auth
//! handshake and correlate responses), so this module only provides:
//! 1. [`connect_ws`]: open a (TLS) WebSocket with extra handshake headers.
//! 2. [`Backoff`]: exponential reconnect delay with reset on success.

use std::collections::HashMap;
use std::time::Duration;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::debug;

use crate::error::{LpError, LpResult};

/// A connected client WebSocket stream.
pub type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Establish a WebSocket connection, adding `extra_headers` to the handshake.
pub async fn connect_ws(url: &str, extra_headers: &HashMap<String, String>) -> LpResult<WsStream> {
    let mut request = url.into_client_request()?;

    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| LpError::WebSocket(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LpError::WebSocket(format!("invalid value for header '{key}': {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, response) = tokio_tungstenite::connect_async(request).await?;
    debug!("[ws] handshake complete with {url} (status {})", response.status());
    Ok(stream)
}

/// Exponential backoff: starts at `initial`, doubles per failure up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial }
    }

    /// Delay to wait before the next attempt; advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Call after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
