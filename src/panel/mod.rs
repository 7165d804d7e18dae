//! One request panel per opened endpoint: the messages exchanged with its
//! view and the handling of each.

pub mod request;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::debug::{DebugState, DebugStatus};
use crate::history;
use crate::i18n;
use crate::launch_settings;
use crate::model::{EndpointDescriptor, RequestHistoryItem};
use crate::project;
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse};
use crate::util;
use request::QueryEntry;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum InboundMessage {
    WebviewReady,
    SendRequest(SendRequestData),
    RequestBaseUrls,
    SaveBaseUrls(Vec<String>),
    StartDebug,
    ClearRequestHistory,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestData {
    #[serde(flatten)]
    pub request: HttpRequest,
    /// Route template to assemble the URL from. When absent `url` is sent
    /// as given.
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Query rows; parsed from `query` when empty.
    #[serde(default)]
    pub params: Vec<QueryEntry>,
    /// Query string as recorded in history.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl SendRequestData {
    /// Final request plus the query string history records.
    pub fn into_request(self) -> (HttpRequest, String) {
        let mut http = self.request;
        if let Some(value) = self.bearer_token.as_deref().and_then(request::bearer_authorization) {
            let has_auth = http
                .headers
                .keys()
                .any(|key| key.eq_ignore_ascii_case("authorization"));
            if !has_auth {
                http.headers.insert("Authorization".to_string(), value);
            }
        }

        let Some(route) = self.route.as_deref() else {
            let query = self.query.unwrap_or_else(|| {
                http
                    .url
                    .split_once('?')
                    .map(|(_, q)| q.to_string())
                    .unwrap_or_default()
            });
            return (http, query);
        };
        let entries = if self.params.is_empty() {
            self.query.as_deref().map(request::parse_query_string).unwrap_or_default()
        } else {
            self.params
        };
        let built = request::build_request_url(
            self.base_url.as_deref().unwrap_or_default().trim_end_matches('/'),
            route,
            &entries,
        );
        http.url = built.url;
        (http, built.query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    pub large_response_threshold_bytes: u64,
    pub max_response_line_numbers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum OutboundMessage {
    I18n(BTreeMap<String, String>),
    RenderSettings(RenderSettings),
    Initialize(EndpointDescriptor),
    LoadBaseUrls(Vec<String>),
    RequestComplete(HttpResponse),
    RequestHistoryLoaded(Vec<RequestHistoryItem>),
    DebugStatus(DebugStatus),
}

pub struct Panel {
    session: Arc<Session>,
    endpoint: EndpointDescriptor,
    pending_init: bool,
    project_path: Option<String>,
}

impl Panel {
    pub fn new(session: Arc<Session>, endpoint: EndpointDescriptor) -> Self {
        Self {
            session,
            endpoint,
            pending_init: true,
            project_path: None,
        }
    }

    /// Tab title: the action name, or the route when there is none.
    pub fn title(&self) -> String {
        let label = if self.endpoint.action.is_empty() {
            &self.endpoint.route_template
        } else {
            &self.endpoint.action
        };
        format!("⚡ {label}")
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    pub fn handle(&mut self, message: InboundMessage) -> Vec<OutboundMessage> {
        match message {
            InboundMessage::WebviewReady => self.on_ready(),
            InboundMessage::SendRequest(data) => self.send_request(data),
            InboundMessage::RequestBaseUrls => vec![self.load_base_urls()],
            InboundMessage::SaveBaseUrls(urls) => {
                match &self.project_path {
                    Some(project) => self.session.base_urls.save_base_urls(project, &urls),
                    None => debug!("base URLs not saved, panel has no project"),
                }
                Vec::new()
            }
            InboundMessage::StartDebug => self.start_debug(),
            InboundMessage::ClearRequestHistory => {
                if let Some(store) = &self.session.history {
                    store.clear(&self.history_key());
                }
                vec![OutboundMessage::RequestHistoryLoaded(Vec::new())]
            }
        }
    }

    fn on_ready(&mut self) -> Vec<OutboundMessage> {
        if !self.pending_init {
            return Vec::new();
        }
        self.pending_init = false;
        self.enrich();
        self.project_path = self.endpoint.project_path.clone();

        let settings = &self.session.settings;
        let mut out = vec![
            OutboundMessage::I18n(i18n::webview_texts(self.session.language)),
            OutboundMessage::RenderSettings(RenderSettings {
                large_response_threshold_bytes: settings.large_response_threshold_bytes(),
                max_response_line_numbers: settings.max_rendered_line_numbers,
            }),
            OutboundMessage::Initialize(self.endpoint.clone()),
            self.load_base_urls(),
        ];
        if let Some(store) = &self.session.history {
            out.push(OutboundMessage::RequestHistoryLoaded(
                store.get_history(&self.history_key()),
            ));
        }
        out
    }

    /// Fills in the project path and full URL. Resolution goes through the
    /// project cache on every open so launch profile edits show up.
    fn enrich(&mut self) {
        let source = Path::new(&self.endpoint.file_path);
        if self.endpoint.project_path.is_none() {
            self.endpoint.project_path =
                project::find_project_file(source).map(|p| p.to_string_lossy().into_owned());
        }
        let base_url = self.session.project_cache.resolve_base_url(source);
        self.endpoint.attach_base_url(base_url.as_deref());
    }

    fn load_base_urls(&self) -> OutboundMessage {
        let urls = match &self.project_path {
            Some(project) => self.session.base_urls.get_base_urls(project),
            None => Vec::new(),
        };
        OutboundMessage::LoadBaseUrls(urls)
    }

    fn send_request(&self, data: SendRequestData) -> Vec<OutboundMessage> {
        let (mut request, query) = data.into_request();
        request.timeout = Some(self.session.settings.request_timeout());
        let response = self.session.transport.send(&request);
        info!(
            method = %request.method,
            url = %request.url,
            status = ?response.status_code,
            duration_ms = response.duration,
            "request sent"
        );

        let mut out = vec![OutboundMessage::RequestComplete(response.clone())];
        if let Some(store) = &self.session.history {
            let item = history::new_item(
                &query,
                request.body.as_deref().unwrap_or_default(),
                response.status_code,
                util::now_millis(),
            );
            let item = history::sanitize_item(&item, self.session.settings.history_max_body_bytes());
            let items = store.add_history(
                &self.history_key(),
                item,
                self.session.settings.request_history_limit,
            );
            out.push(OutboundMessage::RequestHistoryLoaded(items));
        }
        out
    }

    fn start_debug(&self) -> Vec<OutboundMessage> {
        let lang = self.session.language;
        let Some(project) = self.project_path.as_deref() else {
            return vec![OutboundMessage::DebugStatus(DebugStatus::new(
                DebugState::Error,
                i18n::text(lang, "error.noProjectFile", &[]),
            ))];
        };
        let project_file = Path::new(project);
        let name = project_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| project.to_string());
        let starting = OutboundMessage::DebugStatus(DebugStatus::new(
            DebugState::Starting,
            i18n::text(lang, "debug.starting", &[&name]),
        ));

        let env = launch_settings::environment_variables(project_file);
        let outcome = match self.session.launcher.launch(project_file, &env) {
            Ok(pid) => {
                debug!(pid, project, "debug session started");
                DebugStatus::new(DebugState::Running, i18n::text(lang, "debug.running", &[&name]))
            }
            Err(err) => {
                warn!(project, "failed to start project: {err:#}");
                DebugStatus::new(
                    DebugState::Error,
                    i18n::text(lang, "debug.failed", &[&format!("{err:#}")]),
                )
            }
        };
        vec![starting, OutboundMessage::DebugStatus(outcome)]
    }

    fn history_key(&self) -> String {
        history::endpoint_key(Some(&self.endpoint), self.endpoint.http_method.as_str())
    }
}
