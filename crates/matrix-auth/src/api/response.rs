//! Classification of raw API responses.
//!
//! Every endpoint answers with one of two envelopes:
//!
//! - `{"status": "OK", "results": { ... }}` on success
//! - `{"status": "...", "error": "message"}` on failure
//!
//! Anything else is reported as a retrieval failure carrying the raw body.

use serde_json::{Map, Value};
use tracing::debug;

use super::{RawResponse, ResponseError, TransportError};

/// Status value the API uses for a successful call
const STATUS_OK: &str = "OK";

/// The two response envelopes the API is known to produce.
#[derive(Debug, PartialEq)]
enum Envelope {
    Success(Map<String, Value>),
    Failure(String),
}

impl Envelope {
    fn parse(body: &Value) -> Option<Self> {
        let object = body.as_object()?;

        let is_ok = object.get("status").and_then(Value::as_str) == Some(STATUS_OK);
        if is_ok {
            if let Some(Value::Object(results)) = object.get("results") {
                return Some(Envelope::Success(results.clone()));
            }
        }

        match object.get("error") {
            Some(Value::String(message)) => Some(Envelope::Failure(message.clone())),
            _ => None,
        }
    }
}

/// Map the outcome of one HTTP call onto the results payload or a typed failure.
///
/// The HTTP status code is not used for classification; the envelope is
/// authoritative.
pub fn map_response(
    outcome: Result<RawResponse, TransportError>,
) -> Result<Map<String, Value>, ResponseError> {
    let response = outcome?;
    let body = response.body.unwrap_or(Value::Null);

    match Envelope::parse(&body) {
        Some(Envelope::Success(results)) => Ok(results),
        Some(Envelope::Failure(message)) => {
            debug!(status = response.status, error = %message, "API returned an error");
            Err(ResponseError::Api(message))
        }
        None => {
            debug!(status = response.status, "Unrecognized response shape");
            Err(ResponseError::Retrieval(body))
        }
    }
}

/// Pull a required string field out of a results payload.
pub(crate) fn required_str<'a>(results: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    results.get(key).and_then(Value::as_str)
}
