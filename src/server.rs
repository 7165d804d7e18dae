//! Line-delimited JSON host protocol. Each input line is one `{type, data}`
//! message; lines carrying a `panel` field are routed to that panel.
//! Output is written by a single thread so background refreshes and
//! replies never interleave mid-line.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use tracing::{debug, info, warn};

use crate::codelens::LensResult;
use crate::document::SourceDocument;
use crate::panel::{InboundMessage, Panel};
use crate::session::Session;
use crate::util;
use crate::watch::{self, SettingsEvent, WatchMode};

const LOGGED_LINE_BYTES: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    pub watch: WatchMode,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            watch: WatchMode::Auto,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    panel: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPanel {
    file_path: PathBuf,
    /// 0-based.
    line: usize,
}

#[derive(Debug, Deserialize)]
struct PanelRef {
    panel: String,
}

#[derive(Debug, Deserialize)]
struct DocumentRef {
    uri: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

pub fn serve(session: Arc<Session>, options: ServeOptions) -> Result<()> {
    let stdin = io::stdin();
    serve_io(session, options, stdin.lock(), io::stdout())
}

pub fn serve_io<R, W>(session: Arc<Session>, options: ServeOptions, input: R, output: W) -> Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<Value>();
    let writer = thread::spawn(move || -> Result<()> {
        let mut output = output;
        for message in out_rx {
            writeln!(output, "{}", serde_json::to_string(&message)?)?;
            output.flush()?;
        }
        Ok(())
    });

    let watcher = {
        let session = Arc::clone(&session);
        watch::start_settings_watch(session.workspace_root.clone(), options.watch, move |event| match event {
            SettingsEvent::Changed(path) => session.launch_settings_changed(&path),
            SettingsEvent::Rescan => session.project_cache.clear_all(),
        })?
    };

    let mut server = Server::new(session, out_tx);
    for line in input.lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                warn!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if server.handle_line(&line) == Flow::Shutdown {
            break;
        }
    }
    info!(panels = server.panels.len(), "host protocol closed");

    if let Some(handle) = watcher {
        handle.stop();
    }
    drop(server);
    match writer.join() {
        Ok(result) => result.context("write host output"),
        Err(_) => Err(anyhow::anyhow!("output writer panicked")),
    }
}

struct Server {
    session: Arc<Session>,
    panels: HashMap<String, Panel>,
    next_panel: u64,
    out: Sender<Value>,
}

impl Server {
    fn new(session: Arc<Session>, out: Sender<Value>) -> Self {
        Self {
            session,
            panels: HashMap::new(),
            next_panel: 1,
            out,
        }
    }

    fn send(&self, message: Value) {
        let _ = self.out.send(message);
    }

    fn error(&self, message: impl Into<String>) {
        self.send(json!({"type": "error", "data": {"message": message.into()}}));
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                debug!(line = %util::truncate_str_bytes(line, LOGGED_LINE_BYTES), "unparseable input");
                self.error(format!("parse error: {err}"));
                return Flow::Continue;
            }
        };
        if let Some(panel) = envelope.panel.clone() {
            self.panel_message(&panel, envelope);
            return Flow::Continue;
        }
        self.host_command(envelope)
    }

    fn host_command(&mut self, envelope: Envelope) -> Flow {
        let data = envelope.data;
        let result = match envelope.kind.as_str() {
            "openPanel" => decode(data).map(|cmd| self.open_panel(cmd)),
            "closePanel" => decode(data).map(|cmd: PanelRef| {
                if self.panels.remove(&cmd.panel).is_some() {
                    debug!(panel = %cmd.panel, "panel closed");
                }
            }),
            "provideCodeLenses" => decode(data).map(|doc| self.provide_code_lenses(doc)),
            "documentClosed" => decode(data).map(|cmd: DocumentRef| self.session.lenses.close_document(&cmd.uri)),
            "shutdown" => return Flow::Shutdown,
            other => Err(anyhow::anyhow!("unknown message type {other}")),
        };
        if let Err(err) = result {
            self.error(format!("{err:#}"));
        }
        Flow::Continue
    }

    fn open_panel(&mut self, cmd: OpenPanel) {
        match self.session.open_panel(&cmd.file_path, cmd.line) {
            Ok(panel) => {
                let id = format!("panel-{}", self.next_panel);
                self.next_panel += 1;
                info!(panel = %id, endpoint = %panel.title(), "panel opened");
                self.send(json!({
                    "type": "panelOpened",
                    "data": {"panel": id, "title": panel.title(), "endpoint": panel.endpoint()},
                }));
                self.panels.insert(id, panel);
            }
            Err(err) => self.error(format!("{err:#}")),
        }
    }

    fn provide_code_lenses(&self, document: SourceDocument) {
        let uri = document.uri.clone();
        let version = document.version;
        match self.session.lenses.provide(&document) {
            LensResult::Ready(lenses) => self.send(json!({
                "type": "codeLenses",
                "data": {"uri": uri, "version": version, "lenses": lenses, "stale": false},
            })),
            LensResult::Debounced(mut pending) => {
                let stale = pending.take_stale().unwrap_or_default();
                self.send(json!({
                    "type": "codeLenses",
                    "data": {"uri": uri, "version": version, "lenses": stale, "stale": true},
                }));
                let out = self.out.clone();
                thread::spawn(move || {
                    if let Some(lenses) = pending.wait() {
                        let _ = out.send(json!({
                            "type": "codeLensesRefreshed",
                            "data": {"uri": uri, "version": version, "lenses": lenses},
                        }));
                    }
                });
            }
        }
    }

    fn panel_message(&mut self, panel_id: &str, envelope: Envelope) {
        if !self.panels.contains_key(panel_id) {
            self.error(format!("unknown panel {panel_id}"));
            return;
        }
        let mut raw = json!({"type": envelope.kind});
        if !envelope.data.is_null() {
            raw["data"] = envelope.data;
        }
        let message: InboundMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(err) => {
                self.error(format!("invalid panel message: {err}"));
                return;
            }
        };
        let replies = match self.panels.get_mut(panel_id) {
            Some(panel) => panel.handle(message),
            None => return,
        };
        for reply in replies {
            match serde_json::to_value(&reply) {
                Ok(mut value) => {
                    value["panel"] = Value::String(panel_id.to_string());
                    self.send(value);
                }
                Err(err) => warn!("failed to encode panel reply: {err}"),
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).context("invalid message data")
}
