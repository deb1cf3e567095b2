//! Kubernetes event table normalizer.
//!
//! Parses the text output of `kubectl get events` (a header line followed by
//! aligned data lines) into [`Event`] records and assigns each a heuristic
//! severity.
//!
//! Columns are separated by two or more consecutive whitespace characters,
//! which tolerates ragged alignment while keeping single spaces inside
//! messages intact. Short rows are right-padded with empty strings and long
//! rows are truncated to the header's column count; parsing never fails.
//!
//! # Example
//!
//! ```rust
//! use kube_rca_core::normalize::parse_events;
//!
//! let raw = "NAMESPACE   LAST SEEN   TYPE      REASON   OBJECT      MESSAGE\n\
//!            shop        2m          Warning   BackOff  pod/cart-1  Back-off restarting failed container";
//! let events = parse_events(raw);
//! assert_eq!(events[0].pod.as_deref(), Some("cart-1"));
//! assert_eq!(events[0].severity_hint, 7);
//! ```

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Event;

/// Field order of an event table row.
pub const EVENT_COLUMNS: [&str; 6] = [
    "namespace",
    "last_seen",
    "type",
    "reason",
    "object",
    "message",
];

fn column_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s{2,}").expect("column separator pattern is valid"))
}

/// Split one table line into exactly `col_count` fields.
///
/// Trailing whitespace is ignored. Missing fields become empty strings and
/// excess fields are dropped.
pub fn split_row(line: &str, col_count: usize) -> Vec<String> {
    let mut parts: Vec<String> = column_separator()
        .split(line.trim_end())
        .map(str::to_string)
        .collect();
    parts.resize(col_count, String::new());
    parts
}

/// Parse a raw event table into events.
///
/// Blank lines are skipped. The first non-blank line is the header and only
/// determines the column count; fields are mapped positionally onto
/// [`EVENT_COLUMNS`].
pub fn parse_events(raw: &str) -> Vec<Event> {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(h) => h,
        None => return Vec::new(),
    };
    let col_count = column_separator().split(header.trim()).count();

    lines
        .map(|line| {
            let fields = split_row(line, col_count);
            event_from_fields(&fields)
        })
        .collect()
}

fn event_from_fields(fields: &[String]) -> Event {
    let field = |name: &str| -> String {
        EVENT_COLUMNS
            .iter()
            .position(|c| *c == name)
            .and_then(|i| fields.get(i))
            .cloned()
            .unwrap_or_default()
    };

    let namespace = field("namespace");
    let last_seen = field("last_seen");
    let event_type = field("type");
    let reason = field("reason");
    let object = field("object");
    let message = field("message");

    let (resource, pod) = match object.split_once('/') {
        Some((kind, name)) => {
            let pod = (kind == "pod").then(|| name.to_string());
            (Some(kind.to_string()), pod)
        }
        None => (None, None),
    };

    let severity_hint = derive_severity(&event_type, &reason, &message);

    Event {
        namespace,
        last_seen,
        event_type,
        reason,
        object,
        message,
        resource,
        pod,
        severity_hint,
    }
}

/// Heuristic severity for an event, evaluated top to bottom (first match wins):
///
/// | Rule | Severity |
/// |------|----------|
/// | message mentions `imagepullbackoff` or reason mentions `imagepull` | 8 |
/// | reason contains `failed` or type is `Warning` | 7 |
/// | reason contains `backoff` or message contains `back-off` | 6 |
/// | type is `Normal` | 2 |
/// | anything else | 3 |
///
/// All comparisons are case-insensitive.
pub fn derive_severity(event_type: &str, reason: &str, message: &str) -> u8 {
    let event_type = event_type.to_lowercase();
    let reason = reason.to_lowercase();
    let message = message.to_lowercase();

    if message.contains("imagepullbackoff") || reason.contains("imagepull") {
        return 8;
    }
    if reason.contains("failed") || event_type == "warning" {
        return 7;
    }
    if reason.contains("backoff") || message.contains("back-off") {
        return 6;
    }
    if event_type == "normal" {
        return 2;
    }
    3
}
