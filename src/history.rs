//! Per-endpoint request history with retention pruning and masking of
//! credentials before anything is stored.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::{EndpointDescriptor, RequestHistoryItem};
use crate::store::KeyValueStore;
use crate::util;

pub const STORAGE_KEY: &str = "requestHistory.byEndpoint";
const MASK: &str = "***";
const SENSITIVE_QUERY_KEYS: &[&str] = &["authorization", "cookie", "set-cookie", "token"];

static TOKEN_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)("?[\w-]*token[\w-]*"?\s*[:=]\s*)("[^"]*"|[^&\s,;]+)"#).expect("hardcoded regex")
});

type HistoryMap = BTreeMap<String, Vec<RequestHistoryItem>>;

/// History bucket for an endpoint: `{project}|{METHOD}|{route}` with the
/// project path normalized, or `method:{METHOD}` without a descriptor.
pub fn endpoint_key(endpoint: Option<&EndpointDescriptor>, method: &str) -> String {
    match endpoint {
        Some(endpoint) => {
            let project = endpoint
                .project_path
                .as_deref()
                .map(util::normalize_path_key)
                .unwrap_or_default();
            format!(
                "{}|{}|{}",
                project,
                endpoint.http_method.as_str(),
                endpoint.route_template
            )
        }
        None => format!("method:{}", method.trim().to_ascii_uppercase()),
    }
}

/// Builds a history item with a content-derived id.
pub fn new_item(query: &str, body: &str, status_code: Option<u16>, timestamp: i64) -> RequestHistoryItem {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(&[0]);
    hasher.update(body.as_bytes());
    hasher.update(&timestamp.to_le_bytes());
    let id = hasher.finalize().to_hex()[..16].to_string();
    RequestHistoryItem {
        id,
        query: query.to_string(),
        body: body.to_string(),
        timestamp,
        status_code,
    }
}

/// Masks credentials in the query and body. A body longer than
/// `max_body_bytes` after masking is stored empty.
pub fn sanitize_item(item: &RequestHistoryItem, max_body_bytes: Option<usize>) -> RequestHistoryItem {
    let mut body = sanitize_body(&item.body);
    if max_body_bytes.is_some_and(|max| body.len() > max) {
        debug!(id = %item.id, bytes = body.len(), "history body over budget, dropped");
        body = String::new();
    }
    RequestHistoryItem {
        id: item.id.clone(),
        query: sanitize_query(&item.query),
        body,
        timestamp: item.timestamp,
        status_code: item.status_code,
    }
}

pub fn sanitize_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let (prefix, rest) = match query.strip_prefix('?') {
        Some(rest) => ("?", rest),
        None => ("", query),
    };
    let masked: Vec<String> = rest
        .split('&')
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            let lowered = key.trim().to_ascii_lowercase();
            if SENSITIVE_QUERY_KEYS.contains(&lowered.as_str()) {
                format!("{key}={MASK}")
            } else {
                pair.to_string()
            }
        })
        .collect();
    format!("{prefix}{}", masked.join("&"))
}

pub fn sanitize_body(body: &str) -> String {
    if body.trim().is_empty() {
        return body.to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(mut value) => {
            if !mask_token_keys(&mut value) {
                return body.to_string();
            }
            let rendered = if body.contains('\n') {
                serde_json::to_string_pretty(&value)
            } else {
                serde_json::to_string(&value)
            };
            rendered.unwrap_or_default()
        }
        Err(_) => TOKEN_PAIR.replace_all(body, format!("${{1}}{MASK}")).into_owned(),
    }
}

/// Replaces the value of every key containing `token` at any depth.
/// Returns whether anything changed.
fn mask_token_keys(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, child) in map.iter_mut() {
                if key.to_ascii_lowercase().contains("token") {
                    *child = Value::String(MASK.to_string());
                    changed = true;
                } else {
                    changed |= mask_token_keys(child);
                }
            }
            changed
        }
        Value::Array(items) => items.iter_mut().fold(false, |acc, item| mask_token_keys(item) | acc),
        _ => false,
    }
}

/// Request history grouped by endpoint key. The in-memory map is
/// authoritative; every change is written through to the backing store
/// and write failures are only logged.
pub struct RequestHistoryStore {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<HistoryMap>,
    ttl: Option<Duration>,
}

impl RequestHistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Option<Duration>) -> Self {
        let entries = match store.get(STORAGE_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!("discarding unreadable request history: {err}");
                HistoryMap::new()
            }),
            Ok(None) => HistoryMap::new(),
            Err(err) => {
                warn!("failed to load request history: {err:#}");
                HistoryMap::new()
            }
        };
        Self {
            store,
            entries: Mutex::new(entries),
            ttl,
        }
    }

    pub fn get_history(&self, endpoint_key: &str) -> Vec<RequestHistoryItem> {
        self.get_history_at(endpoint_key, util::now_millis())
    }

    /// Prunes expired items everywhere, then returns this key's items
    /// newest first.
    pub fn get_history_at(&self, endpoint_key: &str, now_millis: i64) -> Vec<RequestHistoryItem> {
        let Ok(mut entries) = self.entries.lock() else {
            return Vec::new();
        };
        if self.prune(&mut entries, now_millis) {
            self.persist(&entries);
        }
        let mut items = entries.get(endpoint_key).cloned().unwrap_or_default();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items
    }

    /// Inserts `item` (replacing one with the same id) and keeps at most
    /// `max_count` of the newest items.
    pub fn add_history(
        &self,
        endpoint_key: &str,
        item: RequestHistoryItem,
        max_count: usize,
    ) -> Vec<RequestHistoryItem> {
        let Ok(mut entries) = self.entries.lock() else {
            return Vec::new();
        };
        let list = entries.entry(endpoint_key.to_string()).or_default();
        list.retain(|existing| existing.id != item.id);
        list.insert(0, item);
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list.truncate(max_count.max(1));
        let next = list.clone();
        self.persist(&entries);
        next
    }

    pub fn clear(&self, endpoint_key: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.remove(endpoint_key).is_some() {
            self.persist(&entries);
        }
    }

    fn prune(&self, entries: &mut HistoryMap, now_millis: i64) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let cutoff = now_millis - ttl.as_millis() as i64;
        let before: usize = entries.values().map(Vec::len).sum();
        for items in entries.values_mut() {
            items.retain(|item| item.timestamp >= cutoff);
        }
        entries.retain(|_, items| !items.is_empty());
        let after: usize = entries.values().map(Vec::len).sum();
        if after != before {
            debug!(removed = before - after, "pruned expired request history");
        }
        after != before
    }

    fn persist(&self, entries: &HistoryMap) {
        let result = serde_json::to_value(entries)
            .map_err(anyhow::Error::from)
            .and_then(|value| self.store.set(STORAGE_KEY, &value));
        if let Err(err) = result {
            warn!("failed to persist request history: {err:#}");
        }
    }
}
