//! Signed HTTP API client.
//!
//! Only one endpoint is needed by the quote client:
//!
//! | Operation      | Method | Path               |
//! |----------------|--------|--------------------|
//! | Socket OTP     | GET    | `/v1/socket/token` |
//!
//! Responses share an envelope `{"code": 0, "message": "...", "data": {...}}`;
//! any non-zero `code` is an error.

use std::time::Duration;

use lp_core::config::QuoteConfig;
use lp_core::time_util;
use lp_core::{LpError, LpResult};
use serde::Deserialize;
use tracing::debug;

use crate::auth::{self, Credentials};

const SOCKET_TOKEN_PATH: &str = "/v1/socket/token";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default, alias = "msg")]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct OtpData {
    otp: String,
}

/// HTTP API client holding the shared `reqwest` connection pool.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    access_token: String,
}

impl HttpClient {
    pub fn new(config: &QuoteConfig) -> LpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| LpError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.http_url.trim_end_matches('/').to_string(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Fetch a one-time password for authenticating the quote socket.
    pub async fn get_otp(&self) -> LpResult<String> {
        let data: OtpData = self.get(SOCKET_TOKEN_PATH, &[]).await?;
        if data.otp.is_empty() {
            return Err(LpError::Auth("server returned an empty otp".into()));
        }
        Ok(data.otp)
    }

    /// Signed GET returning the `data` member of the response envelope.
    async fn get<T>(&self, path: &str, params: &[(&str, &str)]) -> LpResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let query = auth::build_query(params);
        let creds = Credentials {
            app_key: &self.app_key,
            app_secret: &self.app_secret,
            access_token: &self.access_token,
        };
        let headers = auth::sign_request(creds, "GET", path, &query, None, &time_util::request_timestamp());

        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        debug!("[http] GET {url}");

        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", headers.api_key)
            .header("Authorization", headers.authorization)
            .header("X-Timestamp", headers.timestamp)
            .header("X-Api-Signature", headers.signature)
            .send()
            .await
            .map_err(|e| LpError::Http(format!("GET {path} failed: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| LpError::Http(format!("GET {path}: failed to read body: {e}")))?;
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LpError::Auth(format!("GET {path} returned {status}: {body}")));
        }
        if !status.is_success() {
            return Err(LpError::Http(format!("GET {path} returned {status}: {body}")));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        if envelope.code != 0 {
            return Err(LpError::Request { code: envelope.code, message: envelope.message });
        }
        envelope.data.ok_or_else(|| LpError::Protocol(format!("GET {path}: response has no data")))
    }
}
