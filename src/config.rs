use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kube_rca_core::diagnose::{DEFAULT_EVIDENCE_BUDGET, DEFAULT_K};
use kube_rca_core::index::{DEFAULT_BATCH_SIZE, STORE_BATCH_CEILING};
use kube_rca_core::models::ChunkIdentity;
use kube_rca_core::retrieval::MAX_PAGE_LIMIT;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub diagnosis: DiagnosisConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
        }
    }
}

fn default_cluster_name() -> String {
    "aks-cluster".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    /// `random` or `content_hash`.
    #[serde(default)]
    pub temporal_ids: ChunkIdentity,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            temporal_ids: ChunkIdentity::Random,
        }
    }
}

/// One day.
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

fn default_window_minutes() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token for `openai`.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embedding_timeout(),
            api_key_env: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout() -> u64 {
    120
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub url: String,
    #[serde(default = "default_inference_model")]
    pub model: String,
    /// `chat` or `completion`.
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_inference_url(),
            model: default_inference_model(),
            style: default_style(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_inference_timeout(),
            api_key_env: None,
        }
    }
}

fn default_inference_url() -> String {
    "http://localhost:4891/v1/chat/completions".to_string()
}
fn default_inference_model() -> String {
    "qwen2.5-3b-instruct-q4_k_m.gguf".to_string()
}
fn default_style() -> String {
    "chat".to_string()
}
fn default_max_tokens() -> u32 {
    600
}
fn default_temperature() -> f32 {
    0.2
}
fn default_inference_timeout() -> u64 {
    170
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosisConfig {
    #[serde(default = "default_evidence_budget")]
    pub evidence_budget: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            evidence_budget: DEFAULT_EVIDENCE_BUDGET,
            default_k: DEFAULT_K,
        }
    }
}

fn default_evidence_budget() -> usize {
    DEFAULT_EVIDENCE_BUDGET
}
fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

fn default_max_limit() -> usize {
    MAX_PAGE_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.indexing.batch_size == 0 || config.indexing.batch_size >= STORE_BATCH_CEILING {
        bail!(
            "indexing.batch_size must be between 1 and {} (store ceiling is {})",
            STORE_BATCH_CEILING - 1,
            STORE_BATCH_CEILING
        );
    }

    if !(1..=MAX_WINDOW_MINUTES).contains(&config.chunking.window_minutes) {
        bail!(
            "chunking.window_minutes must be between 1 and {}",
            MAX_WINDOW_MINUTES
        );
    }
    if config.chunking.temporal_ids == ChunkIdentity::Keyed {
        bail!("chunking.temporal_ids must be random or content_hash");
    }

    if config.diagnosis.evidence_budget == 0 {
        bail!("diagnosis.evidence_budget must be > 0");
    }
    if config.diagnosis.default_k == 0 {
        bail!("diagnosis.default_k must be >= 1");
    }

    if config.retrieval.max_limit == 0 || config.retrieval.max_limit > MAX_PAGE_LIMIT {
        bail!("retrieval.max_limit must be in [1, {}]", MAX_PAGE_LIMIT);
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
    }

    match config.inference.style.as_str() {
        "chat" | "completion" => {}
        other => bail!(
            "Unknown inference style: '{}'. Must be chat or completion.",
            other
        ),
    }
    if config.inference.timeout_secs == 0 {
        bail!("inference.timeout_secs must be > 0");
    }

    Ok(())
}
