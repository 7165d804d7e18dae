use api_console::history::{self, RequestHistoryStore};
use api_console::model::RequestHistoryItem;
use api_console::store::{KeyValueStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

const KEY: &str = "/src/api/api.csproj|POST|/api/users";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn temp_repo_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("api-console-{label}-{nanos}-{counter}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn open_store(root: &Path) -> Arc<dyn KeyValueStore> {
    Arc::new(SqliteStore::open_workspace(root).unwrap())
}

fn item(id: &str, timestamp: i64) -> RequestHistoryItem {
    RequestHistoryItem {
        id: id.to_string(),
        query: String::new(),
        body: format!("{{\"n\":\"{id}\"}}"),
        timestamp,
        status_code: Some(201),
    }
}

fn ids(items: &[RequestHistoryItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

#[test]
fn limit_keeps_newest_items() {
    let root = temp_repo_dir("history-limit");
    let store = RequestHistoryStore::new(open_store(&root), None);

    for (n, id) in ["a", "b", "c", "d"].iter().enumerate() {
        store.add_history(KEY, item(id, 1_000 + n as i64), 3);
    }
    assert_eq!(ids(&store.get_history(KEY)), vec!["d", "c", "b"]);

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn same_id_replaces_existing_entry() {
    let root = temp_repo_dir("history-dedupe");
    let store = RequestHistoryStore::new(open_store(&root), None);

    store.add_history(KEY, item("a", 1_000), 10);
    store.add_history(KEY, item("b", 2_000), 10);
    let mut replay = item("a", 3_000);
    replay.status_code = Some(409);
    let items = store.add_history(KEY, replay, 10);

    assert_eq!(ids(&items), vec!["a", "b"]);
    assert_eq!(items[0].status_code, Some(409));

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn expired_items_are_pruned_on_read_and_persisted() {
    let root = temp_repo_dir("history-ttl");
    let now = 100 * DAY_MS;
    {
        let store = RequestHistoryStore::new(open_store(&root), Some(Duration::from_secs(7 * 24 * 60 * 60)));
        store.add_history(KEY, item("old", now - 8 * DAY_MS), 10);
        store.add_history(KEY, item("recent", now - DAY_MS), 10);
        store.add_history("other", item("stale", now - 30 * DAY_MS), 10);
        assert_eq!(ids(&store.get_history_at(KEY, now)), vec!["recent"]);
        assert!(store.get_history_at("other", now).is_empty());
    }

    let reopened = RequestHistoryStore::new(open_store(&root), None);
    assert_eq!(ids(&reopened.get_history(KEY)), vec!["recent"]);
    assert!(reopened.get_history("other").is_empty());

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn recorded_requests_are_sanitized_before_storage() {
    let root = temp_repo_dir("history-sanitize");
    let store = RequestHistoryStore::new(open_store(&root), None);

    let raw = history::new_item(
        "page=2&token=abc123",
        r#"{"user":"ada","refreshToken":"r-1"}"#,
        Some(200),
        5_000,
    );
    let clean = history::sanitize_item(&raw, Some(64 * 1024));
    store.add_history(KEY, clean, 10);

    let items = store.get_history(KEY);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, raw.id);
    assert_eq!(items[0].query, "page=2&token=***");
    assert_eq!(items[0].body, r#"{"user":"ada","refreshToken":"***"}"#);
    assert!(!items[0].body.contains("r-1"));

    store.clear(KEY);
    assert!(store.get_history(KEY).is_empty());

    let _ = std::fs::remove_dir_all(&root);
}
