//! Error types for the request dispatcher.
//!
//! # Design
//! Callers see a single error type, `NetworkError`, on the failure branch of
//! an `Outcome`. It wraps the underlying `TransportError` together with the
//! request that was attempted and whatever response arrived, so a failure
//! can be inspected the same way a success can.

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};

/// What went wrong while dispatching a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Base URL and path did not resolve to a valid absolute URL.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The configured security policy refused the request.
    #[error("rejected by security policy: {0}")]
    Policy(String),

    /// The HTTP stack failed before a response was received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a status outside 200..=299.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// Reading or writing a local file, or streaming a body, failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response declared JSON but the body did not parse.
    #[error("could not decode response body: {0}")]
    Decode(String),

    /// The blocking task running the transport did not complete.
    #[error("transfer task failed: {0}")]
    Task(String),
}

/// The failure half of an `Outcome`.
#[derive(Debug, Error)]
#[error("{} {} failed: {error}", request_method(.request), request_url(.request))]
pub struct NetworkError {
    #[source]
    pub error: TransportError,
    /// Absent only when no request could be built.
    pub request: Option<HttpRequest>,
    pub response: Option<HttpResponse>,
}

impl NetworkError {
    pub fn new(error: TransportError) -> Self {
        Self {
            error,
            request: None,
            response: None,
        }
    }

    pub fn with_request(mut self, request: HttpRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_response(mut self, response: HttpResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|response| response.status)
    }
}

fn request_method(request: &Option<HttpRequest>) -> &str {
    request.as_ref().map_or("-", |request| request.method.as_str())
}

fn request_url(request: &Option<HttpRequest>) -> &str {
    request.as_ref().map_or("-", |request| request.url.as_str())
}

impl From<TransportError> for NetworkError {
    fn from(error: TransportError) -> Self {
        NetworkError::new(error)
    }
}
