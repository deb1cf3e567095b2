//! Core data models that flow through the evidence pipeline.
//!
//! [`Event`] and [`LogLine`] are the raw inputs, [`Chunk`] is the grouped,
//! embeddable unit of evidence, and [`DiagnosisResult`] is the transient
//! output of a diagnosis run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store::StoredChunk;

/// One row of a Kubernetes event table, after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub namespace: String,
    pub last_seen: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub object: String,
    pub message: String,
    /// Resource kind taken from an `object` of shape `kind/name`.
    pub resource: Option<String>,
    /// Pod name when the object is `pod/<name>`.
    pub pod: Option<String>,
    /// Heuristic severity in `0..=10`.
    pub severity_hint: u8,
}

/// A timestamped container log line, as read from JSON-lines log dumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_unknown")]
    pub pod: String,
    #[serde(default = "default_unknown")]
    pub node: String,
    #[serde(default)]
    pub message: String,
}

fn default_cluster() -> String {
    "local".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_unknown() -> String {
    "unknown".to_string()
}

/// A grouped unit of evidence, embedded and stored as one vector.
///
/// `content` is the human-readable text that gets embedded and later shown
/// as evidence. Chunkers never emit a chunk with empty content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    /// Grouping key for non-temporal chunks (`pod/<name>` or the raw object).
    #[serde(default)]
    pub object: Option<String>,
    /// Reason of the highest-severity member, when the policy knows one.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub start_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub severity_hint: u8,
    #[serde(default, alias = "context_text")]
    pub content: String,
}

impl Chunk {
    /// Flatten the chunk's descriptive fields into vector-store metadata.
    ///
    /// Absent optional fields are omitted rather than stored as `null`.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("cluster".into(), Value::String(self.cluster.clone()));
        meta.insert("namespace".into(), Value::String(self.namespace.clone()));
        let optional = [
            ("pod", self.pod.clone()),
            ("node", self.node.clone()),
            ("object", self.object.clone()),
            ("reason", self.reason.clone()),
            ("start_ts", self.start_ts.map(|t| t.to_rfc3339())),
            ("end_ts", self.end_ts.map(|t| t.to_rfc3339())),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                meta.insert(key.into(), Value::String(v));
            }
        }
        meta.insert("severity_hint".into(), Value::from(self.severity_hint));
        meta
    }

    /// Rebuild a chunk from a stored record, tolerating missing or
    /// oddly-typed metadata written by other tools.
    pub fn from_stored(record: &StoredChunk) -> Self {
        let text = |key: &str| -> Option<String> {
            match record.metadata.get(key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        };
        let ts = |key: &str| {
            text(key)
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        let severity_hint = match record.metadata.get("severity_hint") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0).min(10) as u8,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };

        Self {
            id: record.id.clone(),
            cluster: text("cluster").unwrap_or_default(),
            namespace: text("namespace").unwrap_or_default(),
            pod: text("pod"),
            node: text("node"),
            object: text("object"),
            reason: text("reason"),
            start_ts: ts("start_ts"),
            end_ts: ts("end_ts"),
            severity_hint,
            content: record.document.clone(),
        }
    }
}

/// How a chunker assigns [`Chunk::id`].
///
/// `Keyed` ids are stable across runs, so re-indexing replaces the previous
/// vector. `Random` ids are fresh on every run and re-ingestion therefore
/// duplicates evidence. `ContentHash` ids are stable as long as the grouped
/// text is unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkIdentity {
    #[default]
    Random,
    Keyed,
    ContentHash,
}

impl ChunkIdentity {
    /// Produce an id from the grouping parts.
    pub fn id_for(&self, parts: &[&str]) -> String {
        match self {
            ChunkIdentity::Random => Uuid::new_v4().to_string(),
            ChunkIdentity::Keyed => parts.join("-"),
            ChunkIdentity::ContentHash => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part.as_bytes());
                    hasher.update([0x1f]);
                }
                format!("{:x}", hasher.finalize())
            }
        }
    }
}

/// Output of a diagnosis run. Not persisted by the core.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisResult {
    pub diagnosis_text: String,
    /// Chunks used as evidence, in retrieval order.
    pub evidence: Vec<Chunk>,
    pub matched_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: "payments-pod/api-0".into(),
            cluster: "aks-cluster".into(),
            namespace: "payments".into(),
            pod: Some("api-0".into()),
            node: None,
            object: Some("pod/api-0".into()),
            reason: Some("BackOff".into()),
            start_ts: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            end_ts: None,
            severity_hint: 7,
            content: "NAMESPACE=payments ...".into(),
        }
    }

    #[test]
    fn metadata_omits_absent_fields() {
        let meta = sample_chunk().metadata();
        assert_eq!(meta["namespace"], "payments");
        assert_eq!(meta["severity_hint"], 7);
        assert!(meta.get("node").is_none());
        assert!(meta.get("end_ts").is_none());
    }

    #[test]
    fn from_stored_restores_fields() {
        let chunk = sample_chunk();
        let record = StoredChunk {
            id: chunk.id.clone(),
            document: chunk.content.clone(),
            metadata: chunk.metadata(),
        };
        assert_eq!(Chunk::from_stored(&record), chunk);
    }

    #[test]
    fn from_stored_tolerates_string_severity() {
        let mut metadata = Map::new();
        metadata.insert("severity_hint".into(), Value::String("8".into()));
        metadata.insert("pod".into(), Value::Null);
        let record = StoredChunk {
            id: "x".into(),
            document: "text".into(),
            metadata,
        };
        let chunk = Chunk::from_stored(&record);
        assert_eq!(chunk.severity_hint, 8);
        assert_eq!(chunk.pod, None);
        assert_eq!(chunk.namespace, "");
    }

    #[test]
    fn legacy_context_text_key_is_accepted() {
        let chunk: Chunk =
            serde_json::from_str(r#"{"id":"a","namespace":"ns","context_text":"hello"}"#).unwrap();
        assert_eq!(chunk.content, "hello");
        assert_eq!(chunk.pod, None);
    }

    #[test]
    fn keyed_identity_is_deterministic() {
        assert_eq!(
            ChunkIdentity::Keyed.id_for(&["default", "pod/web-1"]),
            "default-pod/web-1"
        );
        let a = ChunkIdentity::ContentHash.id_for(&["web-1", "text"]);
        let b = ChunkIdentity::ContentHash.id_for(&["web-1", "text"]);
        assert_eq!(a, b);
        assert_ne!(
            ChunkIdentity::Random.id_for(&["x"]),
            ChunkIdentity::Random.id_for(&["x"])
        );
    }

    #[test]
    fn log_line_defaults() {
        let line: LogLine =
            serde_json::from_str(r#"{"timestamp":"2024-05-01T10:00:00Z","message":"ok"}"#)
                .unwrap();
        assert_eq!(line.cluster, "local");
        assert_eq!(line.namespace, "default");
        assert_eq!(line.pod, "unknown");
        assert_eq!(line.node, "unknown");
    }
}
