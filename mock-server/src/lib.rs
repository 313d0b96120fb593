use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const USERNAME: &str = "tsnet";
pub const PASSWORD: &str = "secret";

/// Served by `/json/malformed` with a JSON content type; note the trailing
/// comma.
pub const MALFORMED_JSON: &str = r#"{ "item": { "subitem": "some value", } }"#;

/// Largest body `/files/{size}` will generate.
pub const MAX_FILE_SIZE: usize = 64 * 1024 * 1024;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub query: Vec<(String, String)>,
    pub body: String,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub received: usize,
}

pub type Uploads = Arc<RwLock<HashMap<Uuid, Bytes>>>;

pub fn app() -> Router {
    let uploads: Uploads = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/json", get(json_document))
        .route("/json/malformed", get(malformed_json))
        .route("/text", get(text))
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/protected", get(protected))
        .route("/files/{size}", get(file))
        .route("/uploads", post(store_upload))
        .route("/uploads/{id}", get(fetch_upload))
        .with_state(uploads)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Deterministic content served by `/files/{size}`.
pub fn file_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// `Authorization` value that `/protected` accepts.
pub fn expected_authorization() -> String {
    format!("Basic {}", STANDARD.encode(format!("{USERNAME}:{PASSWORD}")))
}

async fn json_document() -> Json<serde_json::Value> {
    Json(json!({ "item": { "subitem": "some value" } }))
}

async fn malformed_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/JSON; charset=ISO-8859-1")],
        MALFORMED_JSON,
    )
}

async fn text() -> &'static str {
    "hello from mock-server"
}

async fn echo(
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Json(Echo {
        method: method.to_string(),
        query,
        body: String::from_utf8_lossy(&body).into_owned(),
        content_type: header_str(header::CONTENT_TYPE),
        authorization: header_str(header::AUTHORIZATION),
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "status": status.as_u16() }))).into_response()
}

async fn protected(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected_authorization());
    if authorized {
        Json(json!({ "authenticated": true, "user": USERNAME })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"mock-server\"")],
            Json(json!({ "authenticated": false })),
        )
            .into_response()
    }
}

async fn file(Path(size): Path<usize>) -> Result<impl IntoResponse, StatusCode> {
    if size > MAX_FILE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file_bytes(size),
    ))
}

async fn store_upload(State(uploads): State<Uploads>, body: Bytes) -> (StatusCode, Json<UploadReceipt>) {
    let receipt = UploadReceipt {
        id: Uuid::new_v4(),
        received: body.len(),
    };
    uploads.write().await.insert(receipt.id, body);
    (StatusCode::CREATED, Json(receipt))
}

async fn fetch_upload(
    State(uploads): State<Uploads>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let uploads = uploads.read().await;
    let body = uploads.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_bytes_is_deterministic() {
        let bytes = file_bytes(300);
        assert_eq!(bytes.len(), 300);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[250], 250);
        assert_eq!(bytes[251], 0);
        assert_eq!(bytes, file_bytes(300));
    }

    #[test]
    fn expected_authorization_is_basic() {
        assert_eq!(expected_authorization(), "Basic dHNuZXQ6c2VjcmV0");
    }

    #[test]
    fn malformed_json_does_not_parse() {
        assert!(serde_json::from_str::<serde_json::Value>(MALFORMED_JSON).is_err());
    }

    #[test]
    fn echo_serializes_query_as_pairs() {
        let echo = Echo {
            method: "GET".to_string(),
            query: vec![("q".to_string(), "x".to_string())],
            body: String::new(),
            content_type: None,
            authorization: None,
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["query"], serde_json::json!([["q", "x"]]));
        assert!(json["content_type"].is_null());
    }

    #[test]
    fn upload_receipt_roundtrips_through_json() {
        let receipt = UploadReceipt {
            id: Uuid::new_v4(),
            received: 12,
        };
        let json = serde_json::to_string(&receipt).unwrap();
        let back: UploadReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, receipt);
    }
}
