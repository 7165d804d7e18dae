//! Code lens results per document: a version-checked, TTL and LRU bounded
//! cache plus a per-document debounce for re-scans.

use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::analyzer::EndpointAnalyzer;
use crate::config::Settings;
use crate::document::SourceDocument;
use crate::model::EndpointDescriptor;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.start + offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeLensRecord<T> {
    pub version: i64,
    pub results: T,
    pub last_access: Instant,
}

struct PendingTimer {
    generation: u64,
    // Dropping the sender cancels the timer thread.
    _cancel: Sender<()>,
}

type TimerMap = Arc<Mutex<HashMap<String, PendingTimer>>>;

/// Outcome of [`CodeLensCache::debounce`]: an immediate stale value, if one
/// was supplied, and a channel that delivers the recomputed value.
#[derive(Debug)]
pub struct Debounced<T> {
    stale: Option<T>,
    fresh: Receiver<T>,
}

impl<T> Debounced<T> {
    fn ready(value: T) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(value);
        Self {
            stale: None,
            fresh: rx,
        }
    }

    pub fn stale(&self) -> Option<&T> {
        self.stale.as_ref()
    }

    pub fn take_stale(&mut self) -> Option<T> {
        self.stale.take()
    }

    /// Blocks for the fresh value. `None` when the timer was superseded or
    /// cancelled before it fired.
    pub fn wait(self) -> Option<T> {
        self.fresh.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        self.fresh.recv_timeout(timeout).ok()
    }

    pub fn into_receiver(self) -> Receiver<T> {
        self.fresh
    }
}

pub struct CodeLensCache<T> {
    entries: Mutex<LruCache<String, CodeLensRecord<T>>>,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    timers: TimerMap,
    generation: AtomicU64,
}

impl<T> fmt::Debug for CodeLensCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeLensCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> CodeLensCache<T> {
    /// `capacity` 0 means unbounded; `ttl` `None` disables expiry.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        let entries = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
            ttl: ttl.filter(|d| !d.is_zero()),
            clock,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Current record for `key`. Expired records are evicted and reported
    /// as a miss; a hit refreshes the access time and LRU position.
    pub fn get(&self, key: &str) -> Option<CodeLensRecord<T>> {
        let mut entries = self.entries.lock().ok()?;
        let now = self.clock.now();
        let expired = entries
            .peek(key)
            .is_some_and(|record| self.is_expired(record, now));
        if expired {
            entries.pop(key);
            debug!(key, "code lens entry expired");
            return None;
        }
        let record = entries.get_mut(key)?;
        record.last_access = now;
        Some(record.clone())
    }

    /// Cached results only if they were computed for `version`.
    pub fn lookup(&self, key: &str, version: i64) -> Option<T> {
        self.get(key)
            .filter(|record| record.version == version)
            .map(|record| record.results)
    }

    /// Stores results for `version`. A record already holding a newer
    /// version is kept and `false` is returned.
    pub fn set(&self, key: &str, version: i64, results: T) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if entries.peek(key).is_some_and(|record| record.version > version) {
            debug!(key, version, "ignoring results for superseded document version");
            return false;
        }
        let record = CodeLensRecord {
            version,
            results,
            last_access: self.clock.now(),
        };
        if let Some((evicted, _)) = entries.push(key.to_string(), record) {
            if evicted != key {
                debug!(key = %evicted, "code lens entry evicted");
            }
        }
        true
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    /// Drops the entry and any pending timer for a closed document. The
    /// timer goes first so an in-flight scan cannot commit after the purge.
    pub fn close_document(&self, key: &str) {
        self.cancel_timer(key);
        self.remove(key);
    }

    pub fn clear_all(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.clear();
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Schedules `compute` after `delay`, replacing any timer pending for
    /// `key`. `stale` is handed back immediately; the computed value
    /// arrives on the fresh channel. A zero delay computes before returning.
    pub fn debounce<F>(&self, key: &str, delay: Duration, stale: Option<T>, compute: F) -> Debounced<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.debounce_commit(key, delay, stale, compute, |_| {})
    }

    /// Like [`debounce`](Self::debounce), with `commit` run on the computed
    /// value only while the timer is still current. Superseding or closing
    /// the key during `compute` discards the value.
    pub fn debounce_commit<F, C>(
        &self,
        key: &str,
        delay: Duration,
        stale: Option<T>,
        compute: F,
        commit: C,
    ) -> Debounced<T>
    where
        F: FnOnce() -> T + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
    {
        self.cancel_timer(key);
        if delay.is_zero() {
            let value = compute();
            commit(&value);
            return Debounced::ready(value);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let (fresh_tx, fresh_rx) = mpsc::channel();
        if let Ok(mut timers) = self.timers.lock() {
            timers.insert(
                key.to_string(),
                PendingTimer {
                    generation,
                    _cancel: cancel_tx,
                },
            );
        }

        let timers = Arc::clone(&self.timers);
        let key = key.to_string();
        thread::spawn(move || {
            match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    trace!(key = %key, generation, "debounce timer cancelled");
                    return;
                }
            }
            let is_current = |timers: &HashMap<String, PendingTimer>| {
                timers.get(&key).is_some_and(|pending| pending.generation == generation)
            };
            if !timers.lock().is_ok_and(|timers| is_current(&*timers)) {
                return;
            }
            let value = compute();
            {
                let Ok(mut timers) = timers.lock() else {
                    return;
                };
                if !is_current(&*timers) {
                    trace!(key = %key, generation, "debounced result discarded");
                    return;
                }
                timers.remove(&key);
                commit(&value);
            }
            let _ = fresh_tx.send(value);
        });

        Debounced {
            stale,
            fresh: fresh_rx,
        }
    }

    fn cancel_timer(&self, key: &str) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.remove(key);
        }
    }

    fn is_expired(&self, record: &CodeLensRecord<T>, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(record.last_access) > ttl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLens {
    /// 0-based line of the method signature.
    pub line: usize,
    /// Character column of the method name.
    pub column: usize,
    pub title: String,
    pub endpoint: EndpointDescriptor,
}

pub enum LensResult {
    Ready(Vec<CodeLens>),
    Debounced(Debounced<Vec<CodeLens>>),
}

pub struct CodeLensProvider {
    analyzer: Arc<EndpointAnalyzer>,
    cache: Arc<CodeLensCache<Vec<CodeLens>>>,
    debounce: Duration,
}

impl CodeLensProvider {
    pub fn new(analyzer: Arc<EndpointAnalyzer>, cache: Arc<CodeLensCache<Vec<CodeLens>>>, debounce: Duration) -> Self {
        Self {
            analyzer,
            cache,
            debounce,
        }
    }

    pub fn from_settings(analyzer: Arc<EndpointAnalyzer>, settings: &Settings) -> Self {
        let cache = CodeLensCache::new(settings.code_lens_cache_max_entries, settings.code_lens_cache_ttl());
        Self::new(analyzer, Arc::new(cache), settings.code_lens_debounce())
    }

    pub fn cache(&self) -> &Arc<CodeLensCache<Vec<CodeLens>>> {
        &self.cache
    }

    pub fn handles(document: &SourceDocument) -> bool {
        document.language_id == "csharp" && document.file_name().ends_with("Controller.cs")
    }

    pub fn provide(&self, document: &SourceDocument) -> LensResult {
        if !Self::handles(document) {
            return LensResult::Ready(Vec::new());
        }
        let key = document.uri.clone();
        let cached = self.cache.get(&key);
        if let Some(record) = &cached {
            if record.version == document.version {
                trace!(uri = %key, version = document.version, "code lens cache hit");
                return LensResult::Ready(record.results.clone());
            }
        }

        if self.debounce.is_zero() {
            let lenses = scan_lenses(&self.analyzer, document);
            self.cache.set(&key, document.version, lenses.clone());
            return LensResult::Ready(lenses);
        }

        let analyzer = Arc::clone(&self.analyzer);
        let cache = Arc::clone(&self.cache);
        let doc = document.clone();
        let (commit_key, version) = (key.clone(), document.version);
        let debounced = self.cache.debounce_commit(
            &key,
            self.debounce,
            cached.map(|record| record.results),
            move || scan_lenses(&analyzer, &doc),
            move |lenses: &Vec<CodeLens>| {
                cache.set(&commit_key, version, lenses.clone());
            },
        );
        LensResult::Debounced(debounced)
    }

    pub fn close_document(&self, uri: &str) {
        self.cache.close_document(uri);
    }
}

pub fn scan_lenses(analyzer: &EndpointAnalyzer, document: &SourceDocument) -> Vec<CodeLens> {
    analyzer
        .scan_document(document)
        .into_iter()
        .map(|found| CodeLens {
            line: found.line,
            column: found.column,
            title: lens_title(&found.endpoint),
            endpoint: found.endpoint,
        })
        .collect()
}

pub fn lens_title(endpoint: &EndpointDescriptor) -> String {
    format!("⚡ {} {}", endpoint.http_method, endpoint.route_template)
}
