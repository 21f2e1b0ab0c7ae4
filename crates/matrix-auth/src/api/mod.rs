//! Remote API plumbing for the MATRIX identity service.
//!
//! This module provides the `Transport` seam over which every request is
//! sent, the default reqwest-backed transport, and `map_response`, which
//! turns raw responses into results payloads or typed failures.

pub mod error;
pub mod response;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ResponseError, TransportError};
pub use response::map_response;
pub use transport::{Method, RawResponse, ReqwestTransport, Transport};
