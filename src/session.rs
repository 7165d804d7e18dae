//! Everything one workspace session shares: settings, caches, stores and
//! the outbound collaborators. Built once and handed around as `Arc`.

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analyzer::{EndpointAnalyzer, Miss};
use crate::base_urls::BaseUrlConfigManager;
use crate::codelens::CodeLensProvider;
use crate::config::Settings;
use crate::debug::{DebugLauncher, DotnetLauncher};
use crate::document::SourceDocument;
use crate::history::RequestHistoryStore;
use crate::i18n::{self, Language};
use crate::model::EndpointDescriptor;
use crate::panel::Panel;
use crate::project::ProjectConfigCache;
use crate::store::{KeyValueStore, MemoryStore, SqliteStore};
use crate::transport::{HttpTransport, ReqwestTransport};

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Keep workspace state in memory only.
    pub no_state: bool,
}

pub struct Session {
    pub workspace_root: PathBuf,
    pub settings: Settings,
    pub language: Language,
    pub analyzer: Arc<EndpointAnalyzer>,
    pub project_cache: Arc<ProjectConfigCache>,
    pub lenses: CodeLensProvider,
    /// `None` when request history is disabled.
    pub history: Option<RequestHistoryStore>,
    pub base_urls: BaseUrlConfigManager,
    pub transport: Arc<dyn HttpTransport>,
    pub launcher: Arc<dyn DebugLauncher>,
}

impl Session {
    /// Opens a session with the default collaborators: sqlite state under
    /// the workspace, reqwest transport and the `dotnet` launcher.
    pub fn open(workspace_root: &Path, options: SessionOptions) -> Result<Self> {
        let workspace_root = workspace_root
            .canonicalize()
            .with_context(|| format!("open workspace {}", workspace_root.display()))?;
        let settings = Settings::load(&workspace_root);
        let store: Arc<dyn KeyValueStore> = if options.no_state {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SqliteStore::open_workspace(&workspace_root)?)
        };
        let transport = Arc::new(ReqwestTransport::new(settings.request_timeout())?);
        let session = Self::new(
            workspace_root,
            settings,
            store,
            transport,
            Arc::new(DotnetLauncher::new()),
        );
        info!(
            workspace = %session.workspace_root.display(),
            language = session.language.as_str(),
            history = session.history.is_some(),
            "session opened"
        );
        Ok(session)
    }

    pub fn new(
        workspace_root: PathBuf,
        settings: Settings,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        launcher: Arc<dyn DebugLauncher>,
    ) -> Self {
        let analyzer = Arc::new(EndpointAnalyzer::from_settings(&settings));
        let lenses = CodeLensProvider::from_settings(Arc::clone(&analyzer), &settings);
        let history = settings
            .request_history_enabled
            .then(|| RequestHistoryStore::new(store, settings.history_ttl()));
        let base_urls = BaseUrlConfigManager::open_workspace(&workspace_root);
        Self {
            language: settings.ui_language(),
            workspace_root,
            settings,
            analyzer,
            project_cache: Arc::new(ProjectConfigCache::new()),
            lenses,
            history,
            base_urls,
            transport,
            launcher,
        }
    }

    /// Endpoint whose method signature is on `line` (0-based) of
    /// `file_path`, with its project file.
    pub fn detect_endpoint(&self, file_path: &Path, line: usize) -> Result<EndpointDescriptor> {
        let document = SourceDocument::open(file_path)
            .with_context(|| i18n::text(self.language, "error.cannotOpenFile", &[]))?;
        self.analyzer.detect_endpoint(&document, line).map_err(|miss: Miss| {
            debug!(file = %file_path.display(), line, "{miss}");
            let line_no = (line + 1).to_string();
            anyhow!(i18n::text(
                self.language,
                "error.notAnEndpoint",
                &[document.file_name(), line_no.as_str()],
            ))
        })
    }

    pub fn open_panel(self: &Arc<Self>, file_path: &Path, line: usize) -> Result<Panel> {
        let endpoint = self.detect_endpoint(file_path, line)?;
        Ok(Panel::new(Arc::clone(self), endpoint))
    }

    /// A launch settings file changed on disk.
    pub fn launch_settings_changed(&self, path: &Path) {
        self.project_cache.invalidate_launch_settings(path);
    }
}
