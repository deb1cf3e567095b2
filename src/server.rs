//! HTTP retrieval and diagnosis API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/logs` | Filtered, sorted, paginated chunk listing |
//! | `POST` | `/diagnose` | Diagnose by `chunk_id` or `query` |
//! | `GET`  | `/namespaces` | Distinct namespaces in the store |
//! | `GET`  | `/namespaces/{namespace}/pods` | Distinct pods of a namespace |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure carries the pipeline stage that produced it:
//!
//! ```json
//! { "error": "chunk not found: shop-pod/cart-1", "stage": "lookup" }
//! ```
//!
//! Malformed query strings and bodies are reported with stage `request`.
//!
//! Stages: `request` (400), `lookup` (404), `embedding`, `vector_query`,
//! `inference` (502, or 503 when not configured) and `empty_output` (502,
//! with `raw_response`).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser UI.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use kube_rca_core::diagnose::{DiagnoseRequest, Inference, Orchestrator};
use kube_rca_core::embedding::Embedder;
use kube_rca_core::error::{DiagnoseError, RetrievalError, Stage};
use kube_rca_core::models::Chunk;
use kube_rca_core::retrieval::{self, ListPage, ListRequest, LogFilter, SortOrder};
use kube_rca_core::store::VectorStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::inference::HttpInference;
use crate::sqlite_store::open_store;

/// Shared application state passed to all route handlers.
///
/// Collaborators are trait objects so tests can inject fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub inference: Arc<dyn Inference>,
}

impl AppState {
    /// Build production collaborators from configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        let embedder = create_embedder(&config.embedding)?;
        if embedder.is_none() {
            warn!("embedding provider is disabled; /logs falls back to scans and query diagnosis is unavailable");
        }
        Ok(Self {
            config: Arc::new(config.clone()),
            store: Arc::new(store),
            embedder,
            inference: Arc::new(HttpInference::new(&config.inference)?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/logs", get(handle_logs))
        .route("/diagnose", post(handle_diagnose))
        .route("/namespaces", get(handle_namespaces))
        .route("/namespaces/{namespace}/pods", get(handle_pods))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// `krca serve`: bind `[server].bind` and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("kube-rca API listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<Value>,
}

struct AppError {
    status: StatusCode,
    body: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        body: ErrorBody {
            error: message.into(),
            stage: Stage::Request,
            raw_response: None,
        },
    }
}

impl From<DiagnoseError> for AppError {
    fn from(err: DiagnoseError) -> Self {
        let status = status_of(err.status());
        let stage = err.stage();
        let (error, raw_response) = match err {
            DiagnoseError::EmptyResult { raw } => (
                "LLM returned empty output. Model may still be loading.".to_string(),
                Some(raw),
            ),
            other => (other.to_string(), None),
        };
        AppError {
            status,
            body: ErrorBody {
                error,
                stage,
                raw_response,
            },
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        AppError {
            status: status_of(err.status()),
            body: ErrorBody {
                error: err.to_string(),
                stage: err.stage(),
                raw_response: None,
            },
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn lookup_error(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        body: ErrorBody {
            error: err.to_string(),
            stage: Stage::Lookup,
            raw_response: None,
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /logs ============

#[derive(Debug, Deserialize)]
struct LogsParams {
    namespace: Option<String>,
    pod: Option<String>,
    reason: Option<String>,
    q: Option<String>,
    sort_by: Option<String>,
    order: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

const DEFAULT_PAGE_LIMIT: usize = 50;

async fn handle_logs(
    State(state): State<AppState>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> Result<Json<ListPage>, AppError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let max_limit = state.config.retrieval.max_limit;
    if limit == 0 || limit > max_limit {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            max_limit
        )));
    }
    let order = match params.order.as_deref() {
        Some(o) => o.parse::<SortOrder>().map_err(bad_request)?,
        None => SortOrder::Asc,
    };

    let request = ListRequest {
        filter: LogFilter {
            namespace: params.namespace,
            pod: params.pod,
            reason: params.reason,
            query: params.q,
        },
        sort_by: params.sort_by,
        order,
        limit,
        offset: params.offset.unwrap_or(0),
    };

    let page = retrieval::list(state.store.as_ref(), state.embedder.as_deref(), &request).await?;
    Ok(Json(page))
}

// ============ POST /diagnose ============

#[derive(Serialize)]
struct DiagnoseResponse {
    diagnosis: String,
    evidence: Vec<Chunk>,
    matched: usize,
}

async fn handle_diagnose(
    State(state): State<AppState>,
    request: Result<Json<DiagnoseRequest>, JsonRejection>,
) -> Result<Json<DiagnoseResponse>, AppError> {
    let Json(request) = request?;
    let selector = request.selector(state.config.diagnosis.default_k)?;
    info!(?selector, "diagnose");

    let result = Orchestrator::new(
        state.store.as_ref(),
        state.embedder.as_deref(),
        state.inference.as_ref(),
    )
    .with_evidence_budget(state.config.diagnosis.evidence_budget)
    .diagnose(&selector)
    .await
    .inspect_err(|e| warn!(stage = %e.stage(), error = %e, "diagnosis failed"))?;

    Ok(Json(DiagnoseResponse {
        diagnosis: result.diagnosis_text,
        matched: result.matched_count,
        evidence: result.evidence,
    }))
}

// ============ Facets ============

#[derive(Serialize)]
struct NamespacesResponse {
    namespaces: Vec<String>,
}

async fn handle_namespaces(
    State(state): State<AppState>,
) -> Result<Json<NamespacesResponse>, AppError> {
    let namespaces = retrieval::namespaces(state.store.as_ref())
        .await
        .map_err(lookup_error)?;
    Ok(Json(NamespacesResponse { namespaces }))
}

#[derive(Serialize)]
struct PodsResponse {
    namespace: String,
    pods: Vec<String>,
}

async fn handle_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<PodsResponse>, AppError> {
    let pods = retrieval::pods(state.store.as_ref(), &namespace)
        .await
        .map_err(lookup_error)?;
    Ok(Json(PodsResponse { namespace, pods }))
}
