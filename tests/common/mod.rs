//! Fake upstream services shared by the integration tests.

#![allow(dead_code)]

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;

/// Keyword features used by the fake embedding model. The last component is a
/// constant bias so no vector is all zeros.
const FEATURES: [&str; 4] = ["image", "oom", "probe", "schedul"];

pub const FAKE_DIMS: usize = FEATURES.len() + 1;

pub const FAKE_DIAGNOSIS: &str =
    r#"{"root_cause": "image tag cart:v2 does not exist", "confidence": "high"}"#;

pub fn fake_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = FEATURES
        .iter()
        .map(|f| lower.matches(f).count() as f32)
        .collect();
    v.push(0.1);
    v
}

/// Serve `router` on an ephemeral port from a background thread.
pub fn spawn(router: Router) -> String {
    let (tx, rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

/// Ollama-compatible `POST /api/embed`.
pub fn ollama_router() -> Router {
    Router::new().route(
        "/api/embed",
        post(|Json(body): Json<Value>| async move {
            let inputs: Vec<String> = body["input"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let embeddings: Vec<Vec<f32>> = inputs.iter().map(|t| fake_vector(t)).collect();
            Json(json!({ "model": body["model"], "embeddings": embeddings }))
        }),
    )
}

/// OpenAI-compatible `POST /v1/chat/completions` answering with `content`.
pub fn chat_router(content: &'static str) -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(move |Json(_body): Json<Value>| async move {
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            }))
        }),
    )
}

pub const EVENTS_TABLE: &str = "\
NAMESPACE   LAST SEEN   TYPE      REASON       OBJECT          MESSAGE
shop        2m          Warning   Failed       pod/cart-1      Failed to pull image \"cart:v2\": ImagePullBackOff
shop        3m          Normal    Scheduled    pod/cart-1      Successfully assigned shop/cart-1 to node-a
shop        1m          Warning   Unhealthy    pod/web-2       Readiness probe failed: connection refused
billing     5m          Warning   OOMKilling   node/node-b     Memory cgroup out of memory: oom kill
";
