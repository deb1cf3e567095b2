//! Typed errors for the core pipeline.
//!
//! Every diagnosis failure carries a [`Stage`] so callers can report which
//! collaborator failed without parsing messages.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Request,
    Lookup,
    Embedding,
    VectorQuery,
    Inference,
    EmptyOutput,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Lookup => "lookup",
            Stage::Embedding => "embedding",
            Stage::VectorQuery => "vector_query",
            Stage::Inference => "inference",
            Stage::EmptyOutput => "empty_output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a diagnosis run.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("chunk not found: {0}")]
    NotFound(String),

    #[error("no evidence matched the query")]
    NoEvidence,

    #[error("{stage} is not configured: {message}")]
    Configuration { stage: Stage, message: String },

    #[error("{stage} failed: {message}")]
    Upstream { stage: Stage, message: String },

    #[error("inference returned no usable text")]
    EmptyResult { raw: serde_json::Value },
}

impl DiagnoseError {
    pub fn stage(&self) -> Stage {
        match self {
            DiagnoseError::InvalidSelector(_) => Stage::Request,
            DiagnoseError::NotFound(_) | DiagnoseError::NoEvidence => Stage::Lookup,
            DiagnoseError::Configuration { stage, .. } | DiagnoseError::Upstream { stage, .. } => {
                *stage
            }
            DiagnoseError::EmptyResult { .. } => Stage::EmptyOutput,
        }
    }

    /// HTTP status code this error maps to.
    pub fn status(&self) -> u16 {
        match self {
            DiagnoseError::InvalidSelector(_) => 400,
            DiagnoseError::NotFound(_) | DiagnoseError::NoEvidence => 404,
            DiagnoseError::Configuration { .. } => 503,
            DiagnoseError::Upstream { .. } | DiagnoseError::EmptyResult { .. } => 502,
        }
    }

    pub(crate) fn upstream(stage: Stage, err: impl fmt::Display) -> Self {
        DiagnoseError::Upstream {
            stage,
            message: err.to_string(),
        }
    }
}

/// Failure of a filtered listing.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("{stage} failed: {message}")]
    Store { stage: Stage, message: String },
}

impl RetrievalError {
    pub fn status(&self) -> u16 {
        match self {
            RetrievalError::InvalidPage(_) => 400,
            RetrievalError::Store { .. } => 502,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            RetrievalError::InvalidPage(_) => Stage::Request,
            RetrievalError::Store { stage, .. } => *stage,
        }
    }
}

/// Failure of an indexing run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("batch size {requested} is outside 1..{ceiling}")]
    BatchSize { requested: usize, ceiling: usize },

    #[error(
        "store was indexed with embedding model '{stored}' but '{configured}' is configured; \
         re-create the store or switch models"
    )]
    ModelMismatch { stored: String, configured: String },

    #[error("vector store failed: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_snake_case() {
        let s = serde_json::to_string(&Stage::VectorQuery).unwrap();
        assert_eq!(s, "\"vector_query\"");
        assert_eq!(Stage::EmptyOutput.to_string(), "empty_output");
    }

    #[test]
    fn diagnose_error_statuses() {
        assert_eq!(DiagnoseError::InvalidSelector("x".into()).status(), 400);
        assert_eq!(DiagnoseError::NotFound("x".into()).status(), 404);
        assert_eq!(DiagnoseError::NoEvidence.stage(), Stage::Lookup);
        let cfg = DiagnoseError::Configuration {
            stage: Stage::Embedding,
            message: "disabled".into(),
        };
        assert_eq!(cfg.status(), 503);
        assert_eq!(cfg.stage(), Stage::Embedding);
        let up = DiagnoseError::upstream(Stage::Inference, "timeout");
        assert_eq!(up.status(), 502);
        assert_eq!(up.to_string(), "inference failed: timeout");
    }
}
