use serde_json::Value;
use thiserror::Error;

/// The HTTP exchange itself failed: connect, TLS, timeout, body read.
#[derive(Error, Debug)]
#[error("Network error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::with_source(message, err)
    }
}

/// A remote call did not produce the payload we asked for.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// The API rejected the request and said why.
    #[error("API error: {0}")]
    Api(String),

    /// The response matched none of the known shapes; carries the raw value.
    #[error("Invalid response: {}", truncate_value(.0))]
    Retrieval(Value),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Maximum length for raw payloads in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a raw payload to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

fn truncate_value(value: &Value) -> String {
    truncate_body(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(600);
        let truncated = truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.contains("(truncated, 800 total bytes)"));
    }

    #[test]
    fn test_retrieval_display_includes_payload() {
        let err = ResponseError::Retrieval(json!({"unexpected": true}));
        assert_eq!(err.to_string(), r#"Invalid response: {"unexpected":true}"#);
    }

    #[test]
    fn test_transport_display() {
        let err = ResponseError::from(TransportError::new("connection refused"));
        assert_eq!(err.to_string(), "Network error: connection refused");
    }
}
