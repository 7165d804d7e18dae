use ignore::WalkBuilder;
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::analyzer::EndpointAnalyzer;
use crate::document::SourceDocument;
use crate::model::EndpointDescriptor;
use crate::project;
use crate::util;

const CONTROLLER_SUFFIX: &str = "Controller.cs";

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedEndpoint {
    /// 1-based.
    pub line: usize,
    pub column: usize,
    #[serde(flatten)]
    pub endpoint: EndpointDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerReport {
    pub rel_path: String,
    pub endpoints: Vec<ScannedEndpoint>,
}

/// `*Controller.cs` files under `root`, honoring ignore files unless told
/// otherwise. Build output directories are always skipped.
pub fn controller_files(root: &Path, options: ScanOptions) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let is_controller = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(CONTROLLER_SUFFIX));
        if is_controller {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
    match entry.file_name() {
        name if name == OsStr::new(".git") => true,
        name if name == OsStr::new(".vs") => true,
        name if name == OsStr::new(crate::store::STATE_DIR) => true,
        name if is_dir && (name == OsStr::new("bin") || name == OsStr::new("obj")) => true,
        _ => false,
    }
}

/// Every endpoint in every controller under `root`, with project paths
/// attached. Unreadable files are logged and skipped.
pub fn scan_workspace(root: &Path, analyzer: &EndpointAnalyzer, options: ScanOptions) -> Vec<ControllerReport> {
    let mut reports = Vec::new();
    for path in controller_files(root, options) {
        let document = match SourceDocument::open(&path) {
            Ok(document) => document,
            Err(err) => {
                warn!("skipping controller: {err:#}");
                continue;
            }
        };
        let project_path = project::find_project_file(&path).map(|p| p.to_string_lossy().into_owned());
        let endpoints: Vec<ScannedEndpoint> = analyzer
            .scan_document(&document)
            .into_iter()
            .map(|found| {
                let mut endpoint = found.endpoint;
                endpoint.project_path = project_path.clone();
                ScannedEndpoint {
                    line: found.line + 1,
                    column: found.column,
                    endpoint,
                }
            })
            .collect();
        let rel_path = util::normalize_path(path.strip_prefix(root).unwrap_or(&path));
        debug!(file = %rel_path, endpoints = endpoints.len(), "controller scanned");
        reports.push(ControllerReport { rel_path, endpoints });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_controllers_and_skips_build_output() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Api/Controllers")).unwrap();
        fs::create_dir_all(root.join("Api/obj/Debug")).unwrap();
        fs::write(root.join("Api/Controllers/UsersController.cs"), "").unwrap();
        fs::write(root.join("Api/Controllers/Helpers.cs"), "").unwrap();
        fs::write(root.join("Api/obj/Debug/GeneratedController.cs"), "").unwrap();

        let files = controller_files(root, ScanOptions::default());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("Api/Controllers/UsersController.cs"));
    }
}
