//! Embedding backends.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`OpenAiEmbedder`]**: any OpenAI-compatible `POST /v1/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: a local Ollama instance, `POST /api/embed`.
//! - **`LocalEmbedder`**: fastembed in-process (feature `local-embeddings-fastembed`).
//!
//! Every call is bounded by `embedding.timeout_secs`. There is no retry: a
//! failed call surfaces immediately and the caller decides what to do.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use kube_rca::config::EmbeddingConfig;
//! # use kube_rca::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! assert!(create_embedder(&config).unwrap().is_none());
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use kube_rca_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

fn required_model(config: &EmbeddingConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for '{}' provider", config.provider))
}

fn required_dims(config: &EmbeddingConfig) -> Result<usize> {
    config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for '{}' provider", config.provider))
}

fn check_dims(vector: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if vector.len() != dims {
        bail!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            dims
        );
    }
    Ok(vector)
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ OpenAI-compatible ============

/// Embedder for OpenAI-compatible APIs.
///
/// Posts to `{url}/v1/embeddings` (default `https://api.openai.com`). The
/// bearer token is read from the variable named by `api_key_env`
/// (default `OPENAI_API_KEY`); it is optional for local servers.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let key_var = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model: required_model(config)?,
            dims: required_dims(config)?,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key: std::env::var(key_var).ok(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Embedding API error {}: {}", status, body_text);
        }
        let json: Value = response.json().await?;
        let vector = parse_openai_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Invalid embeddings response: empty data array"))?;
        check_dims(vector, self.dims)
    }
}

/// Extract `data[].embedding` arrays in order.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(Value::as_array)
                .map(|e| to_f32_vec(e))
                .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))
        })
        .collect()
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model: required_model(config)?,
            dims: required_dims(config)?,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        let json: Value = response.json().await?;
        let vector = parse_ollama_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Invalid Ollama response: empty embeddings array"))?;
        check_dims(vector, self.dims)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Local (fastembed) ============

/// In-process sentence embeddings. The model is loaded on first use and
/// kept for the lifetime of the embedder.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model, native_dims) = fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(native_dims);
        if dims != native_dims {
            bail!(
                "embedding.dims is {} but '{}' produces {} dimensions",
                dims,
                model_name,
                native_dims
            );
        }
        Ok(Self {
            model_name,
            dims,
            model,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let embedding = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(embedding);
            }
            let embedding = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
            let mut vectors = embedding
                .embed(vec![text], Some(1))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))?;
            vectors
                .pop()
                .ok_or_else(|| anyhow!("Local embedding returned no vector"))
        })
        .await?
    }
}

/// Build the configured embedder, or `None` when the provider is `disabled`.
///
/// | Provider | Embedder |
/// |----------|----------|
/// | `"disabled"` | none |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiEmbedder::new(config)?))),
        "ollama" => Ok(Some(Arc::new(OllamaEmbedder::new(config)?))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Some(Arc::new(LocalEmbedder::new(config)?))),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires building with --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_openai_shape() {
        let json = json!({"data": [{"embedding": [0.5, -1.0]}, {"embedding": [2.0, 0.0]}]});
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.5, -1.0], vec![2.0, 0.0]]);
        assert!(parse_openai_response(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn parses_ollama_shape() {
        let json = json!({"model": "all-minilm", "embeddings": [[0.25, 0.75]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.25, 0.75]]);
        assert!(parse_ollama_response(&json!({"embeddings": ["bad"]})).is_err());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        assert!(check_dims(vec![1.0, 2.0], 3).is_err());
        assert_eq!(check_dims(vec![1.0], 1).unwrap(), vec![1.0]);
    }

    #[test]
    fn disabled_provider_yields_none() {
        assert!(create_embedder(&EmbeddingConfig::default()).unwrap().is_none());
    }

    #[test]
    fn ollama_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            dims: Some(384),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
