//! Request construction: base URL + path + parameters into an `HttpRequest`.
//!
//! Pure functions of a `ClientConfig` and a `RequestSpec`; nothing here
//! touches the network.

use std::collections::BTreeMap;

use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::config::{ClientConfig, ParameterEncoding};
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest};

/// Request parameters. Keys are kept sorted so encoded output is stable.
pub type Parameters = BTreeMap<String, Value>;

/// One request to send: path relative to the base URL, method, parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub path: String,
    pub method: HttpMethod,
    pub parameters: Parameters,
}

impl RequestSpec {
    pub fn new(path: &str, method: HttpMethod) -> Self {
        Self {
            path: path.to_string(),
            method,
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }
}

/// Join `path` onto `base_url`. A path that already carries a scheme is
/// returned unchanged; a `://` inside the query or fragment does not count.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn is_absolute(path: &str) -> bool {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].contains("://")
}

/// Build the request `spec` describes under `config`.
pub fn build_request(config: &ClientConfig, spec: &RequestSpec) -> Result<HttpRequest, TransportError> {
    let joined = resolve_url(config.base_url(), &spec.path);
    let mut url = Url::parse(&joined).map_err(|e| TransportError::InvalidUrl {
        url: joined.clone(),
        reason: e.to_string(),
    })?;

    let mut headers = config.headers().to_vec();
    if let Some(credentials) = config.credentials() {
        headers.push(("Authorization".to_string(), credentials.header_value()));
    }

    let pairs = query_pairs(&spec.parameters);
    let mut body = None;
    if spec.method.encodes_parameters_in_url() {
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(&pairs);
        }
    } else {
        let encoded = match config.parameter_encoding() {
            ParameterEncoding::Form if !pairs.is_empty() => Some((
                "application/x-www-form-urlencoded; charset=utf-8",
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&pairs)
                    .finish()
                    .into_bytes(),
            )),
            ParameterEncoding::Json if !spec.parameters.is_empty() => Some((
                "application/json",
                serde_json::to_vec(&spec.parameters).map_err(|e| TransportError::Decode(e.to_string()))?,
            )),
            _ => None,
        };
        if let Some((content_type, encoded)) = encoded {
            headers.push(("Content-Type".to_string(), content_type.to_string()));
            body = Some(encoded);
        }
    }

    Ok(HttpRequest {
        method: spec.method,
        url: url.into(),
        headers,
        body,
    })
}

/// Flatten parameters into name/value pairs: nested objects become
/// `key[sub]`, arrays become repeated `key[]`.
pub fn query_pairs(parameters: &Parameters) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        flatten(key, value, &mut pairs);
    }
    pairs
}

fn flatten(key: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (sub, nested) in map {
                flatten(&format!("{key}[{sub}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(&format!("{key}[]"), item, pairs);
            }
        }
        Value::Null => pairs.push((key.to_string(), String::new())),
        Value::String(s) => pairs.push((key.to_string(), s.clone())),
        other => pairs.push((key.to_string(), other.to_string())),
    }
}
