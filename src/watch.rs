use anyhow::{Result, anyhow};
use clap::ValueEnum;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const LAUNCH_SETTINGS_FILE: &str = "launchSettings.json";
const PROPERTIES_DIR: &str = "Properties";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchMode {
    Off,
    Auto,
    On,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// A `Properties/launchSettings.json` was created, modified or removed.
    Changed(PathBuf),
    /// The watcher lost events; every cached launch profile is suspect.
    Rescan,
}

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Watches `root` recursively for launch settings changes and reports
/// them to `on_event` from a background thread. In `Auto` mode a watcher
/// that cannot start is logged and skipped; in `On` mode it is an error.
pub fn start_settings_watch<F>(root: PathBuf, mode: WatchMode, on_event: F) -> Result<Option<WatchHandle>>
where
    F: Fn(SettingsEvent) + Send + 'static,
{
    if mode == WatchMode::Off {
        return Ok(None);
    }
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || run_loop(root, mode, stop_rx, ready_tx, on_event));
    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Ok(())) | Err(_) => Ok(Some(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        })),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
    }
}

fn run_loop<F>(root: PathBuf, mode: WatchMode, stop_rx: Receiver<()>, ready: Sender<Result<()>>, on_event: F)
where
    F: Fn(SettingsEvent),
{
    let root = std::fs::canonicalize(&root).unwrap_or(root);
    let (_watcher, event_rx) = match try_start_watcher(&root) {
        Ok(started) => {
            let _ = ready.send(Ok(()));
            started
        }
        Err(err) => {
            if mode == WatchMode::On {
                let _ = ready.send(Err(err));
            } else {
                warn!("launch settings watch disabled: {err:#}");
                let _ = ready.send(Ok(()));
            }
            return;
        }
    };
    debug!(root = %root.display(), "watching launch settings");

    loop {
        if stop_requested(&stop_rx) {
            return;
        }
        match event_rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    on_event(SettingsEvent::Rescan);
                    continue;
                }
                if is_noise_event(&event) {
                    continue;
                }
                for path in event.paths.iter().filter(|p| is_launch_settings(p)) {
                    debug!(path = %path.display(), kind = ?event.kind, "launch settings changed");
                    on_event(SettingsEvent::Changed(path.clone()));
                }
            }
            Ok(Err(err)) => warn!("watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn try_start_watcher(root: &Path) -> Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (event_tx, event_rx) = mpsc::channel();
    let handler = move |res| {
        let _ = event_tx.send(res);
    };
    let mut watcher = notify::recommended_watcher(handler)?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| anyhow!("watch {}: {err}", root.display()))?;
    Ok((watcher, event_rx))
}

fn is_noise_event(event: &Event) -> bool {
    !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// `**/Properties/launchSettings.json`
pub fn is_launch_settings(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == LAUNCH_SETTINGS_FILE)
        && path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|dir| dir == PROPERTIES_DIR)
}
