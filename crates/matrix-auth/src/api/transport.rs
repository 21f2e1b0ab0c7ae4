//! HTTP transport used by the auth client.
//!
//! The client only needs one capability from the network: send a form or
//! query encoded request and hand back the status plus the JSON body. That
//! capability is the `Transport` trait; `ReqwestTransport` is the default
//! implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::TransportError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed JSON body. A body that is not JSON is kept as a string value;
    /// an empty body is `None`.
    pub body: Option<Value>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `GET` parameters go in the query string, `POST`
    /// parameters are form encoded.
    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<RawResponse, TransportError>;
}

/// `Transport` over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, TransportError> {
        let request = match method {
            Method::Get => self.client.get(url).query(params),
            Method::Post => self.client.post(url).form(params),
        };
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<RawResponse, TransportError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(%method, url = url, "Sending request");
            let response = self.send_once(method, url, params).await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(
                    url = url,
                    retry = retries,
                    backoff_ms = backoff_ms,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let text = response.text().await?;
            debug!(url = url, status = status.as_u16(), bytes = text.len(), "Response received");

            return Ok(RawResponse {
                status: status.as_u16(),
                body: parse_body(&text),
            });
        }
    }
}

fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}
