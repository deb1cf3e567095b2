//! Evidence chunking policies.
//!
//! Two interchangeable policies turn normalized records into [`Chunk`]s:
//!
//! - [`TemporalWindowChunker`] anchors on error log lines and collects every
//!   line of the same pod within `±window` of the anchor. One chunk is
//!   emitted per anchor; overlapping chunks are not merged.
//! - [`RelationalChunker`] groups events by `(namespace, pod/<name>)`, or by
//!   `(namespace, object)` for non-pod objects, with deterministic ids.
//!
//! The policy is chosen by the caller. Both can write into the same store.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{Chunk, ChunkIdentity, Event, LogLine};
use crate::normalize::derive_severity;

/// Log message markers that open a temporal chunk (case-sensitive substring match).
pub const ERROR_KEYWORDS: [&str; 7] = [
    "OOMKilled",
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ERROR",
    "Exception",
    "DiskPressure",
    "evicting",
];

/// Default half-width of a temporal window.
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

/// A grouping policy from records of type [`ChunkPolicy::Record`] to chunks.
pub trait ChunkPolicy {
    type Record;

    /// Group `records` into chunks. Never emits a chunk with empty content.
    fn chunk(&self, records: &[Self::Record]) -> Vec<Chunk>;
}

/// Returns true when `message` contains one of [`ERROR_KEYWORDS`].
pub fn is_error_line(message: &str) -> bool {
    !message.is_empty() && ERROR_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Error-anchored time window chunker over log lines.
#[derive(Debug, Clone)]
pub struct TemporalWindowChunker {
    window: Duration,
    identity: ChunkIdentity,
}

impl TemporalWindowChunker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            identity: ChunkIdentity::Random,
        }
    }

    /// Choose the id strategy. Defaults to [`ChunkIdentity::Random`].
    pub fn with_identity(mut self, identity: ChunkIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for TemporalWindowChunker {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_WINDOW_MINUTES))
    }
}

fn render_log_line(line: &LogLine) -> String {
    format!(
        "{} {} {} {} {}",
        line.timestamp.to_rfc3339(),
        line.node,
        line.namespace,
        line.pod,
        line.message
    )
}

impl ChunkPolicy for TemporalWindowChunker {
    type Record = LogLine;

    fn chunk(&self, records: &[LogLine]) -> Vec<Chunk> {
        let mut lines: Vec<&LogLine> = records.iter().collect();
        lines.sort_by_key(|l| l.timestamp);

        let mut chunks = Vec::new();
        for anchor in lines.iter().filter(|l| is_error_line(&l.message)) {
            let start = anchor
                .timestamp
                .checked_sub_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let end = anchor
                .timestamp
                .checked_add_signed(self.window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            let first = lines.partition_point(|l| l.timestamp < start);
            let members: Vec<&LogLine> = lines[first..]
                .iter()
                .take_while(|l| l.timestamp <= end)
                .filter(|l| l.pod == anchor.pod)
                .copied()
                .collect();

            let content = members
                .iter()
                .map(|l| render_log_line(l))
                .collect::<Vec<_>>()
                .join("\n");
            if content.trim().is_empty() {
                continue;
            }

            let severity_hint = members
                .iter()
                .map(|l| derive_severity("", "", &l.message))
                .max()
                .unwrap_or(0);
            let anchor_ts = anchor.timestamp.to_rfc3339();
            let id = self
                .identity
                .id_for(&[&anchor.pod, &anchor_ts, &content]);

            chunks.push(Chunk {
                id,
                cluster: anchor.cluster.clone(),
                namespace: anchor.namespace.clone(),
                pod: Some(anchor.pod.clone()),
                node: Some(anchor.node.clone()),
                object: None,
                reason: None,
                start_ts: Some(start),
                end_ts: Some(end),
                severity_hint,
                content,
            });
        }
        chunks
    }
}

/// Groups events by namespace and object, keyed deterministically.
#[derive(Debug, Clone)]
pub struct RelationalChunker {
    cluster: String,
}

impl RelationalChunker {
    /// `cluster` is stamped on every emitted chunk.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }
}

/// Render one event as a stable, greppable `KEY=value` line.
pub fn render_event_line(event: &Event) -> String {
    format!(
        "NAMESPACE={} LAST_SEEN={} TYPE={} REASON={} OBJECT={} MESSAGE={}",
        event.namespace,
        event.last_seen,
        event.event_type,
        event.reason,
        event.object,
        event.message
    )
}

fn group_key(event: &Event) -> (String, String) {
    let namespace = if event.namespace.is_empty() {
        "default".to_string()
    } else {
        event.namespace.clone()
    };
    let key = match &event.pod {
        Some(pod) if !pod.is_empty() => format!("pod/{}", pod),
        _ if event.object.is_empty() => "unknown".to_string(),
        _ => event.object.clone(),
    };
    (namespace, key)
}

impl ChunkPolicy for RelationalChunker {
    type Record = Event;

    fn chunk(&self, records: &[Event]) -> Vec<Chunk> {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: HashMap<(String, String), Vec<&Event>> = HashMap::new();
        for event in records {
            let key = group_key(event);
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(event);
        }

        let mut chunks = Vec::with_capacity(order.len());
        for key in order {
            let Some(mut members) = groups.remove(&key) else {
                continue;
            };
            let (namespace, object) = key;
            // Stable: equal severities keep encounter order.
            members.sort_by(|a, b| b.severity_hint.cmp(&a.severity_hint));

            let severity_hint = members.iter().map(|e| e.severity_hint).max().unwrap_or(0);
            let pod = members.iter().rev().find_map(|e| e.pod.clone());
            let reason = members
                .first()
                .map(|e| e.reason.clone())
                .filter(|r| !r.is_empty());
            let content = members
                .iter()
                .map(|e| render_event_line(e))
                .collect::<Vec<_>>()
                .join("\n");

            chunks.push(Chunk {
                id: ChunkIdentity::Keyed.id_for(&[&namespace, &object]),
                cluster: self.cluster.clone(),
                namespace,
                pod,
                node: None,
                object: Some(object),
                reason,
                start_ts: None,
                end_ts: None,
                severity_hint,
                content,
            });
        }
        chunks
    }
}
