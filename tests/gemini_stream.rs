//! `GeminiClient` against a local stand-in for the streaming endpoint.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use rewind::config::Config;
use rewind::error::GenerateError;
use rewind::generate::{generate_strategy_code, CodeGenerator, GeminiClient};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

const SSE_BODY: &str = concat!(
    "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"```python\\nimport backtrader as bt\\n\"}]}}]}\r\n\r\n",
    "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"print('hi')\\n```\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
);

/// Serve `status` + `body` for every request and record what arrived.
async fn spawn_stub(status: StatusCode, body: &'static str) -> (String, Seen) {
    let seen = Seen::default();
    let recorder = seen.clone();
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, bytes: Bytes| {
            let recorder = recorder.clone();
            async move {
                assert_eq!(method, Method::POST);
                let key = headers
                    .get("x-goog-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
                recorder
                    .requests
                    .lock()
                    .unwrap()
                    .push((uri.to_string(), key, json));
                let resp: Response = (
                    status,
                    [(header::CONTENT_TYPE, "text/event-stream")],
                    body,
                )
                    .into_response();
                resp
            }
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1beta"), seen)
}

fn client(api_base: &str, api_key: Option<&str>) -> GeminiClient {
    let config = Config {
        api_base: api_base.to_string(),
        api_key: api_key.map(str::to_string),
        model: "test-model".to_string(),
        ..Config::default()
    };
    GeminiClient::from_config(&config).unwrap()
}

#[tokio::test]
async fn streams_and_concatenates_chunks() {
    let (base, seen) = spawn_stub(StatusCode::OK, SSE_BODY).await;
    let client = client(&base, Some("test-key"));

    let raw = client.generate("Buy Condition: x").await.unwrap();
    assert_eq!(raw, "```python\nimport backtrader as bt\nprint('hi')\n```");

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (uri, key, body) = &requests[0];
    assert_eq!(
        uri,
        "/v1beta/models/test-model:streamGenerateContent?alt=sse"
    );
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Buy Condition: x");
    assert_eq!(body["generationConfig"]["temperature"], 0.35);
    assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
}

#[tokio::test]
async fn fences_stripped_end_to_end() {
    let (base, _seen) = spawn_stub(StatusCode::OK, SSE_BODY).await;
    let client = client(&base, Some("test-key"));
    let code = generate_strategy_code(&client, "Buy Condition: x").await;
    assert_eq!(code, "import backtrader as bt\nprint('hi')");
}

#[tokio::test]
async fn quota_status_maps_to_error() {
    let (base, _seen) = spawn_stub(StatusCode::TOO_MANY_REQUESTS, "").await;
    let err = client(&base, Some("k")).generate("x").await.unwrap_err();
    assert!(matches!(err, GenerateError::Quota));
}

#[tokio::test]
async fn auth_failure_becomes_sentinel_code() {
    let (base, _seen) = spawn_stub(StatusCode::FORBIDDEN, "").await;
    let code = generate_strategy_code(&client(&base, Some("bad")), "x").await;
    assert_eq!(code, "# Error: API key is invalid or lacks access (403)");
}

#[tokio::test]
async fn error_payload_in_stream_is_reported() {
    let (base, _seen) = spawn_stub(
        StatusCode::OK,
        "data: {\"error\":{\"code\":500,\"message\":\"internal\"}}\n\n",
    )
    .await;
    let err = client(&base, Some("k")).generate("x").await.unwrap_err();
    assert!(matches!(err, GenerateError::Model(ref m) if m == "internal"));
}

#[tokio::test]
async fn unreachable_endpoint_becomes_sentinel_code() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let code =
        generate_strategy_code(&client(&format!("http://{addr}"), Some("k")), "x").await;
    assert!(code.starts_with("# Error: request failed"), "got: {code}");
}
