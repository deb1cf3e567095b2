mod common;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use kube_rca::config::Config;
use kube_rca::core::chunk::{ChunkPolicy, RelationalChunker};
use kube_rca::core::diagnose::{Inference, InferenceRequest};
use kube_rca::core::embedding::Embedder;
use kube_rca::core::index::EmbeddingIndexer;
use kube_rca::core::normalize::parse_events;
use kube_rca::core::store::memory::InMemoryStore;
use kube_rca::core::store::VectorStore;
use kube_rca::inference::HttpInference;
use kube_rca::server::{router, AppState};

struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "fake-minilm"
    }

    fn dims(&self) -> usize {
        common::FAKE_DIMS
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(common::fake_vector(text))
    }
}

/// Returns a canned response and remembers the last prompt.
struct CannedInference {
    response: Value,
    last_user: Mutex<Option<String>>,
}

impl CannedInference {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            last_user: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Inference for CannedInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<Value> {
        *self.last_user.lock().unwrap() = Some(request.user.clone());
        Ok(self.response.clone())
    }
}

fn test_config() -> Config {
    toml::from_str("[store]\npath = \"unused.sqlite\"\n").unwrap()
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let chunks = RelationalChunker::new("test-cluster").chunk(&parse_events(common::EVENTS_TABLE));
    let report = EmbeddingIndexer::new(store.as_ref(), &KeywordEmbedder, 100)
        .unwrap()
        .index(&chunks)
        .await
        .unwrap();
    assert_eq!(report.indexed, 3);
    store
}

/// Serve the API over `store` and return its base URL.
async fn start(
    store: Arc<InMemoryStore>,
    embedder: Option<Arc<dyn Embedder>>,
    inference: Arc<dyn Inference>,
) -> String {
    let state = AppState {
        config: Arc::new(test_config()),
        store: store as Arc<dyn VectorStore>,
        embedder,
        inference,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn post_diagnose(base: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/diagnose", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn item_ids(page: &Value) -> Vec<&str> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn health_reports_version() {
    let base = start(
        Arc::new(InMemoryStore::new()),
        None,
        CannedInference::new(json!("ok")),
    )
    .await;
    let (status, body) = get_json(&format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn logs_filters_and_sorts() {
    let base = start(seeded_store().await, None, CannedInference::new(json!("ok"))).await;

    let (status, page) = get_json(&format!("{}/logs?namespace=shop", base)).await;
    assert_eq!(status, 200);
    assert_eq!(page["count"], 2);

    let (_, page) = get_json(&format!(
        "{}/logs?sort_by=severity_hint&order=desc&limit=1",
        base
    ))
    .await;
    assert_eq!(page["count"], 3);
    assert_eq!(item_ids(&page), vec!["shop-pod/cart-1"]);
    assert_eq!(page["items"][0]["metadata"]["cluster"], "test-cluster");

    // Without an embedder the query is a case-insensitive substring match.
    let (_, page) = get_json(&format!("{}/logs?q=readiness", base)).await;
    assert_eq!(item_ids(&page), vec!["shop-pod/web-2"]);
}

#[tokio::test]
async fn logs_semantic_query_with_embedder() {
    let base = start(
        seeded_store().await,
        Some(Arc::new(KeywordEmbedder)),
        CannedInference::new(json!("ok")),
    )
    .await;

    let (_, page) = get_json(&format!("{}/logs?q=oom&limit=1", base)).await;
    assert_eq!(item_ids(&page), vec!["billing-node/node-b"]);
    assert!(page["items"][0]["distance"].is_number());
}

#[tokio::test]
async fn logs_rejects_bad_paging_and_order() {
    let base = start(seeded_store().await, None, CannedInference::new(json!("ok"))).await;

    let (status, body) = get_json(&format!("{}/logs?limit=0", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["stage"], "request");

    let (status, _) = get_json(&format!("{}/logs?limit=1001", base)).await;
    assert_eq!(status, 400);

    let (status, body) = get_json(&format!("{}/logs?order=sideways", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["stage"], "request");
}

#[tokio::test]
async fn facets_list_namespaces_and_pods() {
    let base = start(seeded_store().await, None, CannedInference::new(json!("ok"))).await;

    let (status, body) = get_json(&format!("{}/namespaces", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["namespaces"], json!(["billing", "shop"]));

    let (_, body) = get_json(&format!("{}/namespaces/shop/pods", base)).await;
    assert_eq!(body["namespace"], "shop");
    assert_eq!(body["pods"], json!(["cart-1", "web-2"]));

    let (_, body) = get_json(&format!("{}/namespaces/empty/pods", base)).await;
    assert_eq!(body["pods"], json!([]));
}

#[tokio::test]
async fn diagnose_by_chunk_id_sends_evidence_to_model() {
    let inference = CannedInference::new(json!({
        "choices": [{ "message": { "content": common::FAKE_DIAGNOSIS } }]
    }));
    let base = start(seeded_store().await, None, inference.clone()).await;

    let (status, body) = post_diagnose(&base, json!({ "chunk_id": "shop-pod/cart-1" })).await;
    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(body["diagnosis"], common::FAKE_DIAGNOSIS);
    assert_eq!(body["matched"], 1);
    assert_eq!(body["evidence"][0]["namespace"], "shop");

    let prompt = inference.last_user.lock().unwrap().clone().unwrap();
    assert!(prompt.starts_with("Kubernetes evidence:"));
    assert!(prompt.contains("ImagePullBackOff"));
    assert!(prompt.ends_with("Respond ONLY in JSON."));
}

#[tokio::test]
async fn diagnose_by_query_filters_namespace() {
    let base = start(
        seeded_store().await,
        Some(Arc::new(KeywordEmbedder)),
        CannedInference::new(json!({ "response": "node memory pressure" })),
    )
    .await;

    let (status, body) = post_diagnose(
        &base,
        json!({ "query": "oom killed", "k": 3, "namespace": "billing" }),
    )
    .await;
    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(body["diagnosis"], "node memory pressure");
    assert_eq!(body["matched"], 1);
    assert_eq!(body["evidence"][0]["id"], "billing-node/node-b");
}

#[tokio::test]
async fn diagnose_error_contract() {
    let base = start(seeded_store().await, None, CannedInference::new(json!("ok"))).await;

    let (status, body) = post_diagnose(&base, json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["stage"], "request");

    let (status, body) = post_diagnose(&base, json!({ "chunk_id": "missing" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["stage"], "lookup");

    let (status, body) = post_diagnose(&base, json!({ "query": "anything" })).await;
    assert_eq!(status, 503);
    assert_eq!(body["stage"], "embedding");
}

#[tokio::test]
async fn malformed_requests_use_error_contract() {
    let base = start(seeded_store().await, None, CannedInference::new(json!("ok"))).await;

    let (status, body) = post_diagnose(&base, json!({ "chunk_id": 5 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["stage"], "request");
    assert!(body["error"].as_str().unwrap().contains("chunk_id"));

    let resp = reqwest::Client::new()
        .post(format!("{}/diagnose", base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stage"], "request");

    let (status, body) = get_json(&format!("{}/logs?offset=-1", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["stage"], "request");
    assert!(body["error"].as_str().unwrap().contains("offset"));
}

#[tokio::test]
async fn diagnose_empty_output_returns_raw_response() {
    let raw = json!({ "choices": [{ "message": { "content": "   " } }] });
    let base = start(seeded_store().await, None, CannedInference::new(raw.clone())).await;

    let (status, body) = post_diagnose(&base, json!({ "chunk_id": "shop-pod/web-2" })).await;
    assert_eq!(status, 502);
    assert_eq!(body["stage"], "empty_output");
    assert_eq!(body["raw_response"], raw);
}

#[tokio::test]
async fn http_inference_talks_to_chat_endpoint() {
    let url = common::spawn(common::chat_router(common::FAKE_DIAGNOSIS));
    let config: Config = toml::from_str(&format!(
        "[store]\npath = \"x\"\n[inference]\nurl = \"{}/v1/chat/completions\"\n",
        url
    ))
    .unwrap();
    let inference = HttpInference::new(&config.inference).unwrap();

    let raw = inference
        .infer(&InferenceRequest {
            system: "sys".into(),
            user: "evidence".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        raw["choices"][0]["message"]["content"],
        common::FAKE_DIAGNOSIS
    );
}

#[tokio::test]
async fn http_inference_surfaces_upstream_status() {
    // Nothing is routed, so every request is a 404.
    let url = common::spawn(axum::Router::new());
    let config: Config = toml::from_str(&format!(
        "[store]\npath = \"x\"\n[inference]\nurl = \"{}/v1/chat/completions\"\n",
        url
    ))
    .unwrap();
    let inference = HttpInference::new(&config.inference).unwrap();

    let err = inference
        .infer(&InferenceRequest {
            system: "sys".into(),
            user: "evidence".into(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"), "{}", err);
}
