//! Diagnosis orchestration.
//!
//! Given a [`Selector`] (an explicit chunk id, or a free-text query with
//! `k`), the [`Orchestrator`] fetches evidence from the store, assembles a
//! bounded evidence block, calls the [`Inference`] collaborator and
//! normalizes its reply with [`extract_llm_text`].
//!
//! Every external call is mapped to a [`DiagnoseError`] tagged with the
//! [`Stage`] that failed, so callers can tell "no evidence" from "embedding
//! unavailable" from "inference call failed".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{DiagnoseError, Stage};
use crate::models::{Chunk, DiagnosisResult};
use crate::response::extract_llm_text;
use crate::store::VectorStore;

/// Character budget of the assembled evidence block.
pub const DEFAULT_EVIDENCE_BUDGET: usize = 3500;

/// Default number of nearest chunks for query selectors.
pub const DEFAULT_K: usize = 5;

/// Separator between rendered chunks in the evidence block.
pub const EVIDENCE_DELIMITER: &str = "\n\n---\n\n";

pub const SYSTEM_PROMPT: &str = r#"You are an expert Kubernetes and AKS incident analyst.

You are given evidence chunks built from Kubernetes events and container logs.
Event lines carry the fields NAMESPACE, LAST_SEEN, TYPE (Normal, Warning, Error),
REASON, OBJECT (pod/name or resource) and MESSAGE.

Interpret failure patterns:
- ImagePullBackOff or ErrImagePull: image, registry or pull-secret issue
- BackOff or CrashLoopBackOff: restart or retry loop
- OOMKilled: memory limit too low or a leak
- Failed: high severity
- Valid: success confirmation, not a failure

Respond with a single JSON object and nothing else:

{
 "root_cause": "...",
 "affected_components": ["..."],
 "recommended_fix": ["..."],
 "severity": "low | medium | high | critical",
 "notes": "..."
}

If the evidence is insufficient, return:

{
 "root_cause": null,
 "affected_components": [],
 "recommended_fix": ["Collect more logs or kubelet output"],
 "severity": null,
 "notes": "insufficient evidence"
}"#;

/// A diagnosis request as received from a client.
///
/// Exactly one of `chunk_id` and `query` selects evidence. When `query` is
/// absent but `pod` is set, the query defaults to
/// `Investigate issue in pod <pod>`. `namespace` and `pod` post-filter the
/// retrieved evidence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnoseRequest {
    pub chunk_id: Option<String>,
    pub query: Option<String>,
    pub k: Option<usize>,
    pub namespace: Option<String>,
    pub pod: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl DiagnoseRequest {
    /// Validate and resolve into a [`Selector`].
    pub fn selector(&self, default_k: usize) -> Result<Selector, DiagnoseError> {
        let chunk_id = present(&self.chunk_id);
        let query = present(&self.query);
        let namespace = present(&self.namespace);
        let pod = present(&self.pod);

        match (chunk_id, query) {
            (Some(_), Some(_)) => Err(DiagnoseError::InvalidSelector(
                "supply either chunk_id or query, not both".into(),
            )),
            (Some(id), None) => Ok(Selector::ChunkId(id)),
            (None, query) => {
                let text = match (query, &pod) {
                    (Some(q), _) => q,
                    (None, Some(p)) => format!("Investigate issue in pod {}", p),
                    (None, None) => {
                        return Err(DiagnoseError::InvalidSelector(
                            "one of chunk_id or query is required".into(),
                        ))
                    }
                };
                let k = self.k.unwrap_or(default_k);
                if k == 0 {
                    return Err(DiagnoseError::InvalidSelector("k must be at least 1".into()));
                }
                Ok(Selector::Query {
                    text,
                    k,
                    namespace,
                    pod,
                })
            }
        }
    }
}

/// How evidence is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    ChunkId(String),
    Query {
        text: String,
        k: usize,
        namespace: Option<String>,
        pod: Option<String>,
    },
}

/// Render one chunk for the evidence block.
pub fn render_chunk(chunk: &Chunk) -> String {
    let time = match (chunk.start_ts, chunk.end_ts) {
        (Some(s), Some(e)) => format!("{} .. {}", s.to_rfc3339(), e.to_rfc3339()),
        (Some(s), None) => s.to_rfc3339(),
        _ => "-".to_string(),
    };
    format!(
        "id: {}\ntime: {}\nnamespace: {}\npod: {}\nnode: {}\n{}",
        chunk.id,
        time,
        chunk.namespace,
        chunk.pod.as_deref().unwrap_or("-"),
        chunk.node.as_deref().unwrap_or("-"),
        chunk.content
    )
}

/// Join rendered chunks in order and cut the result to `budget` characters.
///
/// Truncation applies to the assembled text, so trailing chunks are cut
/// first and the leading chunk survives as long as the budget allows.
pub fn assemble_evidence(chunks: &[Chunk], budget: usize) -> String {
    let joined = chunks
        .iter()
        .map(render_chunk)
        .collect::<Vec<_>>()
        .join(EVIDENCE_DELIMITER);
    match joined.char_indices().nth(budget) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}

/// Input to the inference collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceRequest {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(evidence: &str) -> InferenceRequest {
    InferenceRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Kubernetes evidence:\n\n{}\n\nRespond ONLY in JSON.",
            evidence
        ),
    }
}

/// A language model endpoint. Returns the raw response body.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> anyhow::Result<Value>;
}

fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted {
        Some(w) => actual.is_some_and(|a| a.eq_ignore_ascii_case(w)),
        None => true,
    }
}

pub struct Orchestrator<'a> {
    store: &'a dyn VectorStore,
    embedder: Option<&'a dyn Embedder>,
    inference: &'a dyn Inference,
    evidence_budget: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: Option<&'a dyn Embedder>,
        inference: &'a dyn Inference,
    ) -> Self {
        Self {
            store,
            embedder,
            inference,
            evidence_budget: DEFAULT_EVIDENCE_BUDGET,
        }
    }

    pub fn with_evidence_budget(mut self, budget: usize) -> Self {
        self.evidence_budget = budget;
        self
    }

    /// Collect evidence for `selector` in retrieval order.
    pub async fn select_evidence(&self, selector: &Selector) -> Result<Vec<Chunk>, DiagnoseError> {
        match selector {
            Selector::ChunkId(id) => {
                let records = self
                    .store
                    .get(Some(std::slice::from_ref(id)))
                    .await
                    .map_err(|e| DiagnoseError::upstream(Stage::Lookup, e))?;
                match records.first() {
                    Some(record) => Ok(vec![Chunk::from_stored(record)]),
                    None => Err(DiagnoseError::NotFound(id.clone())),
                }
            }
            Selector::Query {
                text,
                k,
                namespace,
                pod,
            } => {
                let embedder = self.embedder.ok_or_else(|| DiagnoseError::Configuration {
                    stage: Stage::Embedding,
                    message: "no embedding provider is configured".into(),
                })?;
                let vector = embedder
                    .encode(text)
                    .await
                    .map_err(|e| DiagnoseError::upstream(Stage::Embedding, e))?;
                let hits = self
                    .store
                    .query(&vector, *k)
                    .await
                    .map_err(|e| DiagnoseError::upstream(Stage::VectorQuery, e))?;

                let chunks: Vec<Chunk> = hits
                    .iter()
                    .map(|h| Chunk::from_stored(&h.record))
                    .filter(|c| field_matches(namespace, Some(c.namespace.as_str())))
                    .filter(|c| field_matches(pod, c.pod.as_deref()))
                    .collect();
                if chunks.is_empty() {
                    return Err(DiagnoseError::NoEvidence);
                }
                Ok(chunks)
            }
        }
    }

    /// Run a full diagnosis.
    pub async fn diagnose(&self, selector: &Selector) -> Result<DiagnosisResult, DiagnoseError> {
        let evidence = self.select_evidence(selector).await?;
        let block = assemble_evidence(&evidence, self.evidence_budget);
        debug!(chunks = evidence.len(), chars = block.chars().count(), "evidence assembled");

        let request = build_prompt(&block);
        let raw = self
            .inference
            .infer(&request)
            .await
            .map_err(|e| DiagnoseError::upstream(Stage::Inference, e))?;

        let text = extract_llm_text(&raw);
        if text.trim().is_empty() {
            return Err(DiagnoseError::EmptyResult { raw });
        }
        info!(matched = evidence.len(), "diagnosis complete");

        Ok(DiagnosisResult {
            diagnosis_text: text,
            matched_count: evidence.len(),
            evidence,
        })
    }
}
