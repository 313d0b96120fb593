//! Typed results of a dispatched request.

use std::path::PathBuf;

use serde_json::Value;

use crate::error::{NetworkError, TransportError};
use crate::http::{HttpRequest, HttpResponse};

/// The result object decoded from a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(Value),
    Text(String),
    Data(Vec<u8>),
    /// A completed download, stored at this path.
    File(PathBuf),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Decode a body according to the response's content type.
///
/// JSON bodies that fail to parse return the raw bytes alongside the error
/// so the caller still gets a partial result.
pub fn decode_body(response: &HttpResponse) -> Result<Payload, (Payload, TransportError)> {
    if response.body.is_empty() {
        return Ok(Payload::Empty);
    }
    let content_type = response
        .content_type()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.contains("json") {
        return serde_json::from_slice(&response.body)
            .map(Payload::Json)
            .map_err(|e| (Payload::Data(response.body.clone()), TransportError::Decode(e.to_string())));
    }
    if content_type.starts_with("text/") || content_type.contains("xml") {
        return Ok(Payload::Text(String::from_utf8_lossy(&response.body).into_owned()));
    }
    Ok(Payload::Data(response.body.clone()))
}

/// Exactly one of these is produced for every dispatched request.
#[derive(Debug)]
pub enum Outcome {
    Success {
        result: Payload,
        request: HttpRequest,
        response: HttpResponse,
    },
    Failure {
        /// Whatever could be decoded before the failure, if anything.
        result: Option<Payload>,
        error: NetworkError,
    },
}

impl Outcome {
    pub(crate) fn failure(error: NetworkError) -> Self {
        Outcome::Failure { result: None, error }
    }

    /// Classify a fully read response: non-2xx statuses and undecodable
    /// JSON fail, keeping the decoded (or raw) body as partial result.
    pub(crate) fn from_response(request: HttpRequest, response: HttpResponse) -> Self {
        let decoded = decode_body(&response);
        if !response.is_success() {
            let status = response.status;
            let result = match decoded {
                Ok(Payload::Empty) => None,
                Ok(payload) | Err((payload, _)) => Some(payload),
            };
            return Outcome::Failure {
                result,
                error: NetworkError::new(TransportError::Status { status })
                    .with_request(request)
                    .with_response(response),
            };
        }
        match decoded {
            Ok(result) => Outcome::Success {
                result,
                request,
                response,
            },
            Err((partial, error)) => Outcome::Failure {
                result: Some(partial),
                error: NetworkError::new(error)
                    .with_request(request)
                    .with_response(response),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn result(&self) -> Option<&Payload> {
        match self {
            Outcome::Success { result, .. } => Some(result),
            Outcome::Failure { result, .. } => result.as_ref(),
        }
    }

    /// The request as sent; absent only if it could not be built.
    pub fn request(&self) -> Option<&HttpRequest> {
        match self {
            Outcome::Success { request, .. } => Some(request),
            Outcome::Failure { error, .. } => error.request.as_ref(),
        }
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Outcome::Success { response, .. } => Some(response),
            Outcome::Failure { error, .. } => error.response.as_ref(),
        }
    }

    pub fn into_result(self) -> Result<Payload, NetworkError> {
        match self {
            Outcome::Success { result, .. } => Ok(result),
            Outcome::Failure { error, .. } => Err(error),
        }
    }

    /// Hand the outcome to exactly one of two completion closures.
    pub fn deliver<S, E>(self, on_success: S, on_error: E)
    where
        S: FnOnce(Payload, HttpRequest, HttpResponse),
        E: FnOnce(Option<Payload>, NetworkError),
    {
        match self {
            Outcome::Success {
                result,
                request,
                response,
            } => on_success(result, request, response),
            Outcome::Failure { result, error } => on_error(result, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use serde_json::json;

    fn request() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost:3000/json".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn response(status: u16, content_type: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn json_content_type_is_case_insensitive() {
        let resp = response(200, "application/JSON; charset=ISO-8859-1", r#"{"a":1}"#);
        assert_eq!(decode_body(&resp).unwrap(), Payload::Json(json!({"a": 1})));
    }

    #[test]
    fn malformed_json_keeps_raw_bytes() {
        let body = r#"{ "item": { "subitem": "some value", } }"#;
        let outcome = Outcome::from_response(request(), response(200, "application/json", body));
        match outcome {
            Outcome::Failure { result, error } => {
                assert_eq!(result, Some(Payload::Data(body.as_bytes().to_vec())));
                assert!(matches!(error.error, TransportError::Decode(_)));
                assert_eq!(error.status(), Some(200));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn text_and_binary_bodies() {
        assert_eq!(
            decode_body(&response(200, "text/plain", "hi")).unwrap(),
            Payload::Text("hi".to_string())
        );
        assert_eq!(
            decode_body(&response(200, "application/octet-stream", "hi")).unwrap(),
            Payload::Data(b"hi".to_vec())
        );
        assert_eq!(decode_body(&response(200, "text/plain", "")).unwrap(), Payload::Empty);
    }

    #[test]
    fn error_status_keeps_decoded_body() {
        let outcome =
            Outcome::from_response(request(), response(404, "application/json", r#"{"status":404}"#));
        assert!(!outcome.is_success());
        assert_eq!(outcome.result(), Some(&Payload::Json(json!({"status": 404}))));
        assert_eq!(outcome.response().map(|r| r.status), Some(404));
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err.error, TransportError::Status { status: 404 }));
    }

    #[test]
    fn error_status_with_empty_body_has_no_result() {
        let outcome = Outcome::from_response(request(), response(500, "text/plain", ""));
        assert!(outcome.result().is_none());
    }

    #[test]
    fn deliver_fires_only_success() {
        let outcome = Outcome::from_response(request(), response(200, "text/plain", "ok"));
        let mut fired = Vec::new();
        outcome.deliver(
            |result, request, _| fired.push(format!("ok {} {result:?}", request.url)),
            |_, err| panic!("error closure fired: {err}"),
        );
        assert_eq!(fired, vec!["ok http://localhost:3000/json Text(\"ok\")".to_string()]);
    }

    #[test]
    fn deliver_fires_only_error() {
        let outcome = Outcome::from_response(request(), response(503, "text/plain", "down"));
        let mut fired = 0;
        outcome.deliver(
            |_, _, _| panic!("success closure fired"),
            |result, err| {
                fired += 1;
                assert_eq!(result, Some(Payload::Text("down".to_string())));
                assert_eq!(err.status(), Some(503));
            },
        );
        assert_eq!(fired, 1);
    }
}
