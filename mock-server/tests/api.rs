use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, Generated};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- hello ---

#[tokio::test]
async fn hello_returns_fixed_body() {
    let resp = app().oneshot(get("/hello")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"hello");
}

// --- echo ---

#[tokio::test]
async fn echo_returns_body_and_content_type() {
    let req = Request::builder()
        .method("POST")
        .uri("/echo")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(r#"{"a":1}"#.to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(http::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(&body_bytes(resp).await[..], br#"{"a":1}"#);
}

#[tokio::test]
async fn echo_defaults_to_octet_stream() {
    let req = Request::builder()
        .method("PUT")
        .uri("/echo")
        .body("raw".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(
        resp.headers().get(http::header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
}

#[tokio::test]
async fn echo_rejects_get() {
    let resp = app().oneshot(get("/echo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- anything ---

#[tokio::test]
async fn anything_describes_the_request() {
    let req = Request::builder()
        .method("PATCH")
        .uri("/anything/deep/path?x=1")
        .header("X-Test", "a")
        .body("payload".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.path, "/anything/deep/path");
    assert_eq!(echo.query.as_deref(), Some("x=1"));
    assert_eq!(echo.headers.get("x-test").map(String::as_str), Some("a"));
    assert_eq!(echo.body, "payload");
}

#[tokio::test]
async fn anything_joins_repeated_headers() {
    let req = Request::builder()
        .uri("/anything")
        .header("X-Test", "a")
        .header("x-test", "b")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.headers["x-test"], "a, b");
}

// --- stream ---

#[tokio::test]
async fn stream_sends_numbered_lines() {
    let resp = app().oneshot(get("/stream/3")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(http::header::CONTENT_LENGTH).is_none());
    assert_eq!(&body_bytes(resp).await[..], b"line 0\nline 1\nline 2\n");
}

#[tokio::test]
async fn stream_of_zero_lines_is_empty() {
    let resp = app().oneshot(get("/stream/0")).await.unwrap();
    assert!(body_bytes(resp).await.is_empty());
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    let resp = app().oneshot(get("/status/418")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);

    let resp = app().oneshot(get("/status/503")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_route_rejects_out_of_range_codes() {
    let resp = app().oneshot(get("/status/1000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_route_rejects_non_numeric_codes() {
    let resp = app().oneshot(get("/status/abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- delay / uuid ---

#[tokio::test]
async fn delay_completes() {
    let resp = app().oneshot(get("/delay/5")).await.unwrap();
    assert_eq!(&body_bytes(resp).await[..], b"done");
}

#[tokio::test]
async fn uuid_is_fresh_per_request() {
    let a: Generated = body_json(app().oneshot(get("/uuid")).await.unwrap()).await;
    let b: Generated = body_json(app().oneshot(get("/uuid")).await.unwrap()).await;
    assert_ne!(a.uuid, b.uuid);
    assert_eq!(a.uuid.get_version_num(), 4);
}

// --- routing ---

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = app().oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
