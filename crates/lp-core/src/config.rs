//! Configuration loading for the quote subscriber.
//!
//! Everything is read from environment variables, which the process manager
//! usually seeds from an environment file. The same file can be loaded
//! in-process with [`load_env_file`] for interactive runs.
//!
//! # Variables
//!
//! | Variable                        | Required | Default                                   |
//! |---------------------------------|----------|-------------------------------------------|
//! | `LONGPORT_APP_KEY`              | yes      |                                           |
//! | `LONGPORT_APP_SECRET`           | yes      |                                           |
//! | `LONGPORT_ACCESS_TOKEN`         | yes      |                                           |
//! | `SYMBOLS`                       | yes¹     |                                           |
//! | `LONGPORT_HTTP_URL`             | no       | `https://openapi.longportapp.com`         |
//! | `LONGPORT_QUOTE_WS_URL`         | no       | `wss://openapi-quote.longportapp.com/v2`  |
//! | `LONGPORT_HEARTBEAT_SECS`       | no       | `10`                                      |
//! | `LONGPORT_REQUEST_TIMEOUT_SECS` | no       | `5`                                       |
//!
//! ¹ unless the symbol list is supplied another way (CLI flag or CSV file).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{LpError, LpResult};
use crate::symbols::parse_symbol_list;
use crate::types::Symbol;

pub const ENV_APP_KEY: &str = "LONGPORT_APP_KEY";
pub const ENV_APP_SECRET: &str = "LONGPORT_APP_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "LONGPORT_ACCESS_TOKEN";
pub const ENV_SYMBOLS: &str = "SYMBOLS";
pub const ENV_HTTP_URL: &str = "LONGPORT_HTTP_URL";
pub const ENV_QUOTE_WS_URL: &str = "LONGPORT_QUOTE_WS_URL";
pub const ENV_HEARTBEAT_SECS: &str = "LONGPORT_HEARTBEAT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "LONGPORT_REQUEST_TIMEOUT_SECS";

pub const DEFAULT_HTTP_URL: &str = "https://openapi.longportapp.com";
pub const DEFAULT_QUOTE_WS_URL: &str = "wss://openapi-quote.longportapp.com/v2";
const DEFAULT_HEARTBEAT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Connection settings for the quote service.
#[derive(Clone)]
pub struct QuoteConfig {
    /// Application key (sent in `X-Api-Key`).
    pub app_key: String,
    /// Application secret for HMAC-SHA256 request signing.
    pub app_secret: String,
    /// Access token (sent in `Authorization`).
    pub access_token: String,
    /// HTTP API base URL, no trailing slash.
    pub http_url: String,
    /// Quote WebSocket URL.
    pub quote_ws_url: String,
    /// Interval between heartbeat frames on the quote socket.
    pub heartbeat_interval: Duration,
    /// How long to wait for a response to any request.
    pub request_timeout: Duration,
}

impl fmt::Debug for QuoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteConfig")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("http_url", &self.http_url)
            .field("quote_ws_url", &self.quote_ws_url)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl QuoteConfig {
    /// Build from the process environment.
    pub fn from_env() -> LpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build through an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> LpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (Some(app_key), Some(app_secret), Some(access_token)) =
            (get(ENV_APP_KEY), get(ENV_APP_SECRET), get(ENV_ACCESS_TOKEN))
        else {
            return Err(LpError::Config(format!(
                "{ENV_APP_KEY}, {ENV_APP_SECRET} and {ENV_ACCESS_TOKEN} must be set in the environment"
            )));
        };

        let http_url = match get(ENV_HTTP_URL) {
            Some(url) => {
                debug!("[config] {ENV_HTTP_URL} override: {url}");
                validate_url(ENV_HTTP_URL, &url, &["http", "https"])?
            }
            None => DEFAULT_HTTP_URL.to_string(),
        };
        let quote_ws_url = match get(ENV_QUOTE_WS_URL) {
            Some(url) => {
                debug!("[config] {ENV_QUOTE_WS_URL} override: {url}");
                validate_url(ENV_QUOTE_WS_URL, &url, &["ws", "wss"])?
            }
            None => DEFAULT_QUOTE_WS_URL.to_string(),
        };

        let heartbeat_interval = parse_secs(ENV_HEARTBEAT_SECS, get(ENV_HEARTBEAT_SECS), DEFAULT_HEARTBEAT_SECS)?;
        let request_timeout =
            parse_secs(ENV_REQUEST_TIMEOUT_SECS, get(ENV_REQUEST_TIMEOUT_SECS), DEFAULT_REQUEST_TIMEOUT_SECS)?;

        Ok(Self { app_key, app_secret, access_token, http_url, quote_ws_url, heartbeat_interval, request_timeout })
    }
}

/// Top-level application config: connection settings plus the subscription set.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub quote: QuoteConfig,
    /// Symbols to subscribe, in operator order, deduplicated.
    pub symbols: Vec<Symbol>,
}

impl AppConfig {
    /// Build from the process environment.
    ///
    /// When `symbols` is `Some`, it replaces the `SYMBOLS` variable.
    pub fn from_env(symbols: Option<Vec<Symbol>>) -> LpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), symbols)
    }

    pub fn from_lookup<F>(lookup: F, symbols: Option<Vec<Symbol>>) -> LpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let quote = QuoteConfig::from_lookup(&lookup)?;
        let symbols = match symbols {
            Some(list) if !list.is_empty() => list,
            _ => parse_symbol_list(&lookup(ENV_SYMBOLS).unwrap_or_default())?,
        };
        Ok(Self { quote, symbols })
    }
}

/// Load `KEY=VALUE` pairs from an environment file into the process
/// environment. Variables that are already set keep their values.
///
/// Returns `Ok(false)` when the file does not exist and `required` is false.
/// Runs before logging is initialized, so the caller reports the outcome.
pub fn load_env_file(path: &Path, required: bool) -> LpResult<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() && !required => Ok(false),
        Err(e) => Err(LpError::Config(format!("failed to load environment file {}: {e}", path.display()))),
    }
}

fn validate_url(var: &str, value: &str, schemes: &[&str]) -> LpResult<String> {
    let parsed = url::Url::parse(value).map_err(|e| LpError::Config(format!("{var} is not a valid URL: {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(LpError::Config(format!("{var} must use one of {schemes:?}, got '{}'", parsed.scheme())));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_secs(var: &str, value: Option<String>, default: u64) -> LpResult<Duration> {
    let secs = match value {
        Some(v) => v.parse::<u64>().map_err(|_| LpError::Config(format!("{var} must be a whole number of seconds")))?,
        None => default,
    };
    if secs == 0 {
        return Err(LpError::Config(format!("{var} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
