//! Scripted in-memory transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Method, RawResponse, Transport, TransportError};

/// Route test logs through the test writer; filter with RUST_LOG.
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Replies with queued outcomes in order and records every request.
/// An exhausted queue answers with a transport error.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `latency` (paused-clock friendly).
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn reply(&self, body: Value) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(RawResponse {
            status: 200,
            body: Some(body),
        }));
        self
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(message)));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted reply")))
    }
}
