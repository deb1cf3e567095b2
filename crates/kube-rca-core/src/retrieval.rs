//! Filtered, sorted, paginated evidence listing.
//!
//! Two paths produce the candidate set:
//!
//! - **Semantic**: a `query` is present and an [`Embedder`] is available.
//!   The store returns the `limit + offset` nearest records and the
//!   structured filters are applied *afterwards*. A page can therefore hold
//!   fewer items than requested even when more matching records exist.
//! - **Scan**: no query, no embedder, or the query failed to encode. Every
//!   stored record is scanned and `query` becomes a case-insensitive
//!   substring match on the document.
//!
//! Structured filters (`namespace`, `pod`, `reason`) are case-insensitive
//! exact matches. Missing metadata is treated as an empty string. Sorting
//! never fails: keys that cannot be compared fall back to ordering by id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::warn;

use crate::embedding::Embedder;
use crate::error::{RetrievalError, Stage};
use crate::store::{StoredChunk, VectorStore};

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub reason: Option<String>,
    pub query: Option<String>,
}

impl LogFilter {
    fn matches(&self, record: &StoredChunk) -> bool {
        let checks = [
            ("namespace", &self.namespace),
            ("pod", &self.pod),
            ("reason", &self.reason),
        ];
        checks.iter().all(|(key, wanted)| match non_blank(wanted) {
            Some(w) => meta_text(record, key).eq_ignore_ascii_case(w),
            None => true,
        })
    }

    fn query_text(&self) -> Option<&str> {
        non_blank(&self.query)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn meta_text(record: &StoredChunk, key: &str) -> String {
    record.meta_str(key).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}' (expected asc or desc)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub filter: LogFilter,
    /// Metadata field, or `id` / `document`.
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            filter: LogFilter::default(),
            sort_by: None,
            order: SortOrder::Asc,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListItem {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl ListItem {
    fn from_record(record: StoredChunk, distance: Option<f32>) -> Self {
        Self {
            id: record.id,
            document: record.document,
            metadata: record.metadata,
            distance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    /// Size of the filtered set before pagination.
    pub count: usize,
    pub items: Vec<ListItem>,
}

/// Run a listing.
pub async fn list(
    store: &dyn VectorStore,
    embedder: Option<&dyn Embedder>,
    req: &ListRequest,
) -> Result<ListPage, RetrievalError> {
    if req.limit == 0 || req.limit > MAX_PAGE_LIMIT {
        return Err(RetrievalError::InvalidPage(format!(
            "limit must be between 1 and {}, got {}",
            MAX_PAGE_LIMIT, req.limit
        )));
    }

    let mut items = match (req.filter.query_text(), embedder) {
        (Some(q), Some(embedder)) => match embedder.encode(q).await {
            Ok(vector) => semantic_candidates(store, &vector, req).await?,
            Err(e) => {
                warn!(error = %e, "query embedding failed, falling back to scan");
                scan_candidates(store, &req.filter).await?
            }
        },
        _ => scan_candidates(store, &req.filter).await?,
    };

    if let Some(field) = req.sort_by.as_deref().filter(|f| !f.trim().is_empty()) {
        sort_items(&mut items, field.trim(), req.order);
    }

    let count = items.len();
    let items = items.into_iter().skip(req.offset).take(req.limit).collect();
    Ok(ListPage { count, items })
}

async fn semantic_candidates(
    store: &dyn VectorStore,
    vector: &[f32],
    req: &ListRequest,
) -> Result<Vec<ListItem>, RetrievalError> {
    let k = req.limit.saturating_add(req.offset);
    let hits = store
        .query(vector, k)
        .await
        .map_err(|e| RetrievalError::Store {
            stage: Stage::VectorQuery,
            message: e.to_string(),
        })?;
    Ok(hits
        .into_iter()
        .filter(|h| req.filter.matches(&h.record))
        .map(|h| ListItem::from_record(h.record, Some(h.distance)))
        .collect())
}

async fn scan_candidates(
    store: &dyn VectorStore,
    filter: &LogFilter,
) -> Result<Vec<ListItem>, RetrievalError> {
    let records = store.get(None).await.map_err(|e| RetrievalError::Store {
        stage: Stage::Lookup,
        message: e.to_string(),
    })?;
    let needle = filter.query_text().map(str::to_lowercase);
    Ok(records
        .into_iter()
        .filter(|r| filter.matches(r))
        .filter(|r| match &needle {
            Some(n) => r.document.to_lowercase().contains(n),
            None => true,
        })
        .map(|r| ListItem::from_record(r, None))
        .collect())
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Text(String),
    Number(f64),
    Bool(bool),
}

fn sort_key(item: &ListItem, field: &str) -> Option<SortKey> {
    match field {
        "id" => return Some(SortKey::Text(item.id.clone())),
        "document" => return Some(SortKey::Text(item.document.to_lowercase())),
        "distance" => return item.distance.map(|d| SortKey::Number(d as f64)),
        _ => {}
    }
    match item.metadata.get(field) {
        None | Some(Value::Null) => Some(SortKey::Text(String::new())),
        Some(Value::String(s)) => Some(SortKey::Text(s.to_lowercase())),
        Some(Value::Number(n)) => n.as_f64().map(SortKey::Number),
        Some(Value::Bool(b)) => Some(SortKey::Bool(*b)),
        Some(_) => None,
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Option<Ordering> {
    match (a, b) {
        (SortKey::Text(x), SortKey::Text(y)) => Some(x.cmp(y)),
        (SortKey::Number(x), SortKey::Number(y)) => x.partial_cmp(y),
        (SortKey::Bool(x), SortKey::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort by `field`, ties broken by ascending `id`. Text compares case-insensitively.
///
/// Any incomparable pair makes the whole sort fall back to `id`.
fn sort_items(items: &mut [ListItem], field: &str, order: SortOrder) {
    let keys: Option<Vec<SortKey>> = items.iter().map(|i| sort_key(i, field)).collect();
    let comparable = keys.as_ref().is_some_and(|keys| {
        keys.windows(2).all(|w| compare_keys(&w[0], &w[1]).is_some())
    });

    match keys {
        Some(keys) if comparable => {
            let mut keyed: Vec<(SortKey, ListItem)> =
                keys.into_iter().zip(items.iter().cloned()).collect();
            keyed.sort_by(|(a, item_a), (b, item_b)| {
                let ord = compare_keys(a, b).unwrap_or(Ordering::Equal);
                let ord = match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                };
                ord.then_with(|| item_a.id.cmp(&item_b.id))
            });
            for (slot, (_, item)) in items.iter_mut().zip(keyed) {
                *slot = item;
            }
        }
        _ => {
            warn!(field, "unsortable field, falling back to id order");
            items.sort_by(|a, b| match order {
                SortOrder::Asc => a.id.cmp(&b.id),
                SortOrder::Desc => b.id.cmp(&a.id),
            });
        }
    }
}

/// Distinct namespaces across stored chunks, sorted.
pub async fn namespaces(store: &dyn VectorStore) -> anyhow::Result<Vec<String>> {
    let records = store.get(None).await?;
    let set: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.meta_str("namespace"))
        .filter(|s| !s.is_empty())
        .collect();
    Ok(set.into_iter().collect())
}

/// Distinct pods of `namespace` (case-insensitive), sorted.
pub async fn pods(store: &dyn VectorStore, namespace: &str) -> anyhow::Result<Vec<String>> {
    let records = store.get(None).await?;
    let set: BTreeSet<String> = records
        .iter()
        .filter(|r| meta_text(r, "namespace").eq_ignore_ascii_case(namespace))
        .filter_map(|r| r.meta_str("pod"))
        .filter(|s| !s.is_empty())
        .collect();
    Ok(set.into_iter().collect())
}
