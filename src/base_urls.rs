//! Per-project base URL lists persisted to
//! `<workspace>/.vscode/csharp-api-console-config.json`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::util;

pub const CONFIG_FILE: &str = "csharp-api-console-config.json";
const WRITE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseUrlConfig {
    #[serde(default)]
    pub base_urls: BTreeMap<String, Vec<String>>,
}

enum Signal {
    Schedule,
    Flush(Sender<()>),
    Shutdown,
}

pub struct BaseUrlConfigManager {
    path: PathBuf,
    config: Arc<Mutex<BaseUrlConfig>>,
    signal: Sender<Signal>,
    writer: Option<thread::JoinHandle<()>>,
}

impl BaseUrlConfigManager {
    pub fn open_workspace(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(".vscode").join(CONFIG_FILE), WRITE_DEBOUNCE)
    }

    pub fn new(path: PathBuf, debounce: Duration) -> Self {
        let config = Arc::new(Mutex::new(load(&path)));
        let (signal, signal_rx) = mpsc::channel();
        let writer = {
            let path = path.clone();
            let config = Arc::clone(&config);
            thread::spawn(move || run_writer(&path, &config, debounce, signal_rx))
        };
        Self {
            path,
            config,
            signal,
            writer: Some(writer),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_base_urls(&self, project_path: &str) -> Vec<String> {
        self.config
            .lock()
            .ok()
            .and_then(|config| config.base_urls.get(project_path).cloned())
            .unwrap_or_default()
    }

    /// Replaces the list for `project_path`. Blank entries are dropped and
    /// duplicates collapsed; the file write is debounced.
    pub fn save_base_urls(&self, project_path: &str, urls: &[String]) {
        let mut cleaned: Vec<String> = Vec::new();
        for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !cleaned.iter().any(|existing| existing == url) {
                cleaned.push(url.to_string());
            }
        }
        if let Ok(mut config) = self.config.lock() {
            if cleaned.is_empty() {
                config.base_urls.remove(project_path);
            } else {
                config.base_urls.insert(project_path.to_string(), cleaned);
            }
        }
        let _ = self.signal.send(Signal::Schedule);
    }

    pub fn all(&self) -> BaseUrlConfig {
        self.config.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Writes any pending change now and waits for it.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.signal.send(Signal::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Flushes pending writes and stops the writer thread.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.signal.send(Signal::Shutdown);
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BaseUrlConfigManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn load(path: &Path) -> BaseUrlConfig {
    if !path.is_file() {
        return BaseUrlConfig::default();
    }
    let parsed = util::read_to_string(path).and_then(|raw| {
        serde_json::from_str(&util::strip_json_comments(&raw))
            .with_context(|| format!("parse {}", path.display()))
    });
    match parsed {
        Ok(config) => config,
        Err(err) => {
            warn!("ignoring unreadable base URL config: {err:#}");
            BaseUrlConfig::default()
        }
    }
}

fn run_writer(path: &Path, config: &Mutex<BaseUrlConfig>, debounce: Duration, signal_rx: Receiver<Signal>) {
    let mut dirty = false;
    loop {
        let signal = if dirty {
            signal_rx.recv_timeout(debounce)
        } else {
            signal_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };
        match signal {
            Ok(Signal::Schedule) => dirty = true,
            Ok(Signal::Flush(ack)) => {
                if dirty {
                    write_config(path, config);
                    dirty = false;
                }
                let _ = ack.send(());
            }
            Err(RecvTimeoutError::Timeout) => {
                write_config(path, config);
                dirty = false;
            }
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                if dirty {
                    write_config(path, config);
                }
                return;
            }
        }
    }
}

fn write_config(path: &Path, config: &Mutex<BaseUrlConfig>) {
    let result = config
        .lock()
        .map_err(|_| anyhow::anyhow!("base URL config poisoned"))
        .and_then(|config| serde_json::to_string_pretty(&*config).map_err(anyhow::Error::from))
        .and_then(|json| util::write_atomic(path, &json));
    match result {
        Ok(()) => debug!(path = %path.display(), "base URL config written"),
        Err(err) => warn!("failed to write base URL config: {err:#}"),
    }
}
