use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, expected_authorization, file_bytes, Echo, UploadReceipt, MALFORMED_JSON};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- json ---

#[tokio::test]
async fn json_document() {
    let resp = app().oneshot(request("GET", "/json")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let value: serde_json::Value = body_json(resp).await;
    assert_eq!(value["item"]["subitem"], "some value");
}

#[tokio::test]
async fn malformed_json_keeps_json_content_type() {
    let resp = app().oneshot(request("GET", "/json/malformed")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[http::header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.to_ascii_lowercase().starts_with("application/json"));
    assert_eq!(body_bytes(resp).await, MALFORMED_JSON.as_bytes());
}

#[tokio::test]
async fn head_json_has_no_body() {
    let resp = app().oneshot(request("HEAD", "/json")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.is_empty());
}

// --- echo ---

#[tokio::test]
async fn echo_reports_query_pairs() {
    let resp = app()
        .oneshot(request("DELETE", "/echo?id=7&tags%5B%5D=a&tags%5B%5D=b"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "DELETE");
    assert_eq!(
        echo.query,
        vec![
            ("id".to_string(), "7".to_string()),
            ("tags[]".to_string(), "a".to_string()),
            ("tags[]".to_string(), "b".to_string()),
        ]
    );
    assert!(echo.body.is_empty());
}

#[tokio::test]
async fn echo_reports_body_and_content_type() {
    let req = Request::builder()
        .method("PATCH")
        .uri("/echo")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("name=tsnet".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.body, "name=tsnet");
    assert_eq!(echo.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
    assert!(echo.query.is_empty());
}

#[tokio::test]
async fn echo_accepts_trace() {
    let resp = app().oneshot(request("TRACE", "/echo")).await.unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "TRACE");
}

// --- status ---

#[tokio::test]
async fn status_route_replies_with_requested_code() {
    let resp = app().oneshot(request("PUT", "/status/418")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    let value: serde_json::Value = body_json(resp).await;
    assert_eq!(value["status"], 418);
}

#[tokio::test]
async fn status_route_rejects_non_numeric_code() {
    let resp = app().oneshot(request("GET", "/status/teapot")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- protected ---

#[tokio::test]
async fn protected_without_credentials_is_401() {
    let resp = app().oneshot(request("GET", "/protected")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(http::header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn protected_with_credentials() {
    let req = Request::builder()
        .uri("/protected")
        .header(http::header::AUTHORIZATION, expected_authorization())
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let value: serde_json::Value = body_json(resp).await;
    assert_eq!(value["authenticated"], true);
}

// --- files ---

#[tokio::test]
async fn file_has_content_length() {
    let resp = app().oneshot(request("GET", "/files/1000")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_LENGTH], "1000");
    assert_eq!(body_bytes(resp).await, file_bytes(1000));
}

#[tokio::test]
async fn file_too_large_is_rejected() {
    let resp = app()
        .oneshot(request("GET", "/files/999999999999"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// --- uploads ---

#[tokio::test]
async fn upload_then_fetch() {
    let app = app();
    let req = Request::builder()
        .method("POST")
        .uri("/uploads")
        .header(http::header::CONTENT_TYPE, "application/octet-stream")
        .body("payload bytes".to_string())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let receipt: UploadReceipt = body_json(resp).await;
    assert_eq!(receipt.received, 13);

    let resp = app
        .oneshot(request("GET", &format!("/uploads/{}", receipt.id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "payload bytes");
}

#[tokio::test]
async fn fetch_unknown_upload_is_404() {
    let resp = app()
        .oneshot(request("GET", "/uploads/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fetch_upload_bad_uuid_returns_400() {
    let resp = app().oneshot(request("GET", "/uploads/not-a-uuid")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
