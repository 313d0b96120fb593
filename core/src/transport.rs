//! The HTTP stack the dispatcher delegates to.
//!
//! # Design
//! `Transport` is a blocking trait: one call sends a request and returns
//! the status, headers and a reader over the response body. The dispatcher
//! runs it on tokio's blocking pool and decides what to do with the body
//! (buffer it, or stream it to a file while reporting progress).
//! Connection reuse, TLS and wire parsing all live behind this trait.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use ureq::tls::TlsConfig;
use ureq::{Agent, SendBody};

use crate::error::TransportError;
use crate::http::{find_header, HttpRequest, HttpResponse};
use crate::security::SecurityPolicy;

/// A request body streamed from a reader rather than held in memory.
pub struct UploadStream {
    pub reader: Box<dyn Read + Send>,
    pub length: u64,
}

impl fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadStream").field("length", &self.length).finish()
    }
}

/// A response whose body has not been read yet.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read>,
}

impl StreamingResponse {
    /// Declared body length. Ignored for content-encoded bodies, whose
    /// decoded size differs from the header.
    pub fn content_length(&self) -> Option<u64> {
        if find_header(&self.headers, "content-encoding").is_some() {
            return None;
        }
        find_header(&self.headers, "content-length").and_then(|value| value.trim().parse().ok())
    }

    /// Status and headers with an empty body.
    pub fn head(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Vec::new(),
        }
    }

    /// Buffer the whole body.
    pub fn into_response(mut self) -> io::Result<HttpResponse> {
        let mut body = Vec::new();
        self.body.read_to_end(&mut body)?;
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

pub trait Transport: fmt::Debug + Send + Sync {
    /// Send `request`, with `upload` as the body when present. HTTP error
    /// statuses are returned as responses, not errors.
    fn execute(
        &self,
        request: &HttpRequest,
        upload: Option<UploadStream>,
        policy: &dyn SecurityPolicy,
    ) -> Result<StreamingResponse, TransportError>;
}

/// `Transport` backed by `ureq`.
pub struct UreqTransport {
    verified: Agent,
    unverified: Agent,
    timeout: Option<Duration>,
}

impl UreqTransport {
    /// `timeout` bounds each whole request, body included.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            verified: agent(timeout, false),
            unverified: agent(timeout, true),
            timeout,
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn agent(timeout: Option<Duration>, disable_verification: bool) -> Agent {
    let tls = TlsConfig::builder()
        .disable_verification(disable_verification)
        .build();
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .tls_config(tls)
        .build()
        .new_agent()
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: &HttpRequest,
        upload: Option<UploadStream>,
        policy: &dyn SecurityPolicy,
    ) -> Result<StreamingResponse, TransportError> {
        let agent = if policy.allows_invalid_certificates() {
            &self.unverified
        } else {
            &self.verified
        };

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = match (upload, &request.body) {
            (Some(mut upload), _) => {
                let http_request = builder
                    .header("Content-Length", upload.length.to_string())
                    .body(SendBody::from_reader(&mut upload.reader))
                    .map_err(invalid_request)?;
                agent.run(http_request)
            }
            (None, Some(body)) => agent.run(builder.body(body.as_slice()).map_err(invalid_request)?),
            (None, None) => agent.run(builder.body(SendBody::none()).map_err(invalid_request)?),
        };
        let response = result.map_err(|e| TransportError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.into_body().into_reader();

        Ok(StreamingResponse {
            status,
            headers,
            body: Box::new(body),
        })
    }
}

fn invalid_request(err: ureq::http::Error) -> TransportError {
    TransportError::Transport(format!("invalid request: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn streaming(headers: &[(&str, &str)], body: &'static [u8]) -> StreamingResponse {
        StreamingResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Box::new(Cursor::new(body)),
        }
    }

    #[test]
    fn content_length_from_header() {
        assert_eq!(streaming(&[("Content-Length", " 42 ")], b"").content_length(), Some(42));
        assert_eq!(streaming(&[], b"").content_length(), None);
        assert_eq!(streaming(&[("content-length", "abc")], b"").content_length(), None);
    }

    #[test]
    fn encoded_body_has_no_declared_length() {
        let resp = streaming(&[("content-length", "10"), ("content-encoding", "gzip")], b"");
        assert_eq!(resp.content_length(), None);
    }

    #[test]
    fn into_response_buffers_body() {
        let resp = streaming(&[("content-type", "text/plain")], b"hello").into_response().unwrap();
        assert_eq!(resp.body, b"hello");
        assert_eq!(resp.content_type(), Some("text/plain"));
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let transport = UreqTransport::new(Some(Duration::from_secs(2)));
        let request = HttpRequest {
            method: crate::http::HttpMethod::Get,
            url: "http://127.0.0.1:1/".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = transport
            .execute(&request, None, &crate::security::DefaultSecurityPolicy::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::Transport(_)), "{err:?}");
    }
}
