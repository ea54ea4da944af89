use std::{collections::BTreeMap, convert::Infallible, time::Duration};

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

/// Longest delay `/delay/{ms}` will honour.
pub const MAX_DELAY_MS: u64 = 10_000;

/// Everything `/anything` saw about a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Generated {
    pub uuid: Uuid,
}

#[derive(Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub delay_ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", post(echo).put(echo))
        .route("/anything", any(anything))
        .route("/anything/{*rest}", any(anything))
        .route("/stream/{lines}", get(stream))
        .route("/status/{code}", get(status).post(status))
        .route("/delay/{ms}", get(delay))
        .route("/uuid", get(generate_uuid))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello() -> &'static str {
    "hello"
}

/// Reply with the request body and its content type.
async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn anything(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut seen = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        seen.entry(name.as_str().to_string())
            .and_modify(|v: &mut String| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// `lines` newline-terminated lines, sent as a streamed (chunked) body.
async fn stream(Path(lines): Path<usize>, Query(params): Query<StreamParams>) -> Response {
    let delay = Duration::from_millis(params.delay_ms.min(MAX_DELAY_MS));
    let chunks = futures_util::stream::unfold(0usize, move |i| async move {
        if i >= lines {
            return None;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let line = Bytes::from(format!("line {i}\n"));
        Some((Ok::<_, Infallible>(line), i + 1))
    });
    ([(header::CONTENT_TYPE, "text/plain")], Body::from_stream(chunks)).into_response()
}

async fn status(Path(code): Path<u16>) -> Result<StatusCode, StatusCode> {
    StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)
}

async fn delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms.min(MAX_DELAY_MS))).await;
    "done"
}

async fn generate_uuid() -> Json<Generated> {
    Json(Generated {
        uuid: Uuid::new_v4(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "GET".to_string(),
            path: "/anything".to_string(),
            query: None,
            headers: BTreeMap::from([("host".to_string(), "x".to_string())]),
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["headers"]["host"], "x");
        assert!(json["query"].is_null());
    }

    #[test]
    fn echo_query_is_optional_when_deserializing() {
        let echo: Echo = serde_json::from_str(
            r#"{"method":"POST","path":"/anything","headers":{},"body":"b"}"#,
        )
        .unwrap();
        assert!(echo.query.is_none());
        assert_eq!(echo.body, "b");
    }

    #[test]
    fn stream_params_default_to_no_delay() {
        let params: StreamParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.delay_ms, 0);
    }
}
