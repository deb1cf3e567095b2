//! HTTP inference client.
//!
//! Sends the diagnosis prompt to an OpenAI-compatible endpoint, either as a
//! chat request (`messages`) or a completion request (`prompt`), and
//! returns the raw response body for [`extract_llm_text`] to normalize.
//!
//! [`extract_llm_text`]: kube_rca_core::response::extract_llm_text

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use kube_rca_core::diagnose::{Inference, InferenceRequest};

use crate::config::InferenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStyle {
    Chat,
    Completion,
}

pub struct HttpInference {
    client: reqwest::Client,
    url: String,
    model: String,
    style: RequestStyle,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpInference {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let style = match config.style.as_str() {
            "chat" => RequestStyle::Chat,
            "completion" => RequestStyle::Completion,
            other => bail!("Unknown inference style: '{}'", other),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            style,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key,
        })
    }

    /// Request body for `request` in the configured style.
    pub fn payload(&self, request: &InferenceRequest) -> Value {
        match self.style {
            RequestStyle::Chat => json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": request.system},
                    {"role": "user", "content": request.user},
                ],
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "stream": false,
            }),
            RequestStyle::Completion => json!({
                "model": self.model,
                "prompt": format!("{}\n\n{}", request.system, request.user),
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "stream": false,
            }),
        }
    }
}

#[async_trait]
impl Inference for HttpInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<Value> {
        let mut call = self.client.post(&self.url).json(&self.payload(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        debug!(url = %self.url, model = %self.model, "sending inference request");
        let response = call.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("Inference API error {}: {}", status, body);
        }

        // Some local servers answer with plain text.
        Ok(serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body)))
    }
}
