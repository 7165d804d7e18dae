use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::launch_settings;

const PROJECT_EXTENSION: &str = "csproj";
const MAX_ANCESTOR_LEVELS: usize = 10;

/// Nearest `*.csproj` walking up from the directory of `source_file`, at
/// most ten levels. Stops at the filesystem root or on a read error.
pub fn find_project_file(source_file: &Path) -> Option<PathBuf> {
    let mut current = source_file.parent()?.to_path_buf();
    for _ in 0..MAX_ANCESTOR_LEVELS {
        match project_file_in_dir(&current) {
            Ok(Some(found)) => return Some(found),
            Ok(None) => {}
            Err(err) => {
                debug!(dir = %current.display(), "project lookup stopped: {err}");
                return None;
            }
        }
        let parent = current.parent()?.to_path_buf();
        if parent == current {
            return None;
        }
        current = parent;
    }
    None
}

/// The project file directly inside `dir`; the first by name when several
/// exist.
pub fn project_file_in_dir(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_project = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PROJECT_EXTENSION));
        if is_project && entry.file_type()?.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Two-tier cache from a source file to its project's base URL.
///
/// Tier 1 maps a source directory to its project directory and is never
/// invalidated. Tier 2 maps a project directory to its resolved base URL
/// (or the absence of one) and is dropped when that project's
/// `Properties/launchSettings.json` changes.
#[derive(Debug, Default)]
pub struct ProjectConfigCache {
    project_dirs: Mutex<HashMap<PathBuf, PathBuf>>,
    base_urls: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl ProjectConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL for the project owning `source_file`, or `None` when no
    /// project or usable launch profile exists.
    pub fn resolve_base_url(&self, source_file: &Path) -> Option<String> {
        let project_dir = self.project_dir(source_file)?;
        if let Some(hit) = self.base_urls.lock().ok()?.get(&project_dir) {
            debug!(project = %project_dir.display(), "base url cache hit");
            return hit.clone();
        }

        let resolved = match project_file_in_dir(&project_dir) {
            Ok(Some(project_file)) => launch_settings::base_url(&project_file),
            Ok(None) => None,
            Err(err) => {
                warn!(project = %project_dir.display(), "failed to list project dir: {err}");
                None
            }
        };
        debug!(project = %project_dir.display(), base_url = ?resolved, "base url resolved");
        self.base_urls
            .lock()
            .ok()?
            .insert(project_dir, resolved.clone());
        resolved
    }

    /// Project directory for `source_file`, memoized per source directory.
    pub fn project_dir(&self, source_file: &Path) -> Option<PathBuf> {
        let source_dir = source_file.parent()?.to_path_buf();
        if let Some(hit) = self.project_dirs.lock().ok()?.get(&source_dir) {
            return Some(hit.clone());
        }
        let project_dir = find_project_file(source_file)?.parent()?.to_path_buf();
        self.project_dirs
            .lock()
            .ok()?
            .insert(source_dir, project_dir.clone());
        Some(project_dir)
    }

    /// Drops the tier-2 entry for the project owning
    /// `<project>/Properties/launchSettings.json`. Returns whether an entry
    /// was removed.
    pub fn invalidate_launch_settings(&self, settings_path: &Path) -> bool {
        let Some(project_dir) = settings_path.parent().and_then(Path::parent) else {
            return false;
        };
        let removed = self
            .base_urls
            .lock()
            .map(|mut map| map.remove(project_dir).is_some())
            .unwrap_or(false);
        if removed {
            debug!(project = %project_dir.display(), "base url cache invalidated");
        }
        removed
    }

    pub fn clear_all(&self) {
        if let Ok(mut map) = self.project_dirs.lock() {
            map.clear();
        }
        if let Ok(mut map) = self.base_urls.lock() {
            map.clear();
        }
    }

    pub fn cached_base_url_count(&self) -> usize {
        self.base_urls.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_nearest_project_file() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("Api");
        let controllers = project.join("Controllers").join("V1");
        fs::create_dir_all(&controllers).unwrap();
        fs::write(project.join("Api.csproj"), "<Project />").unwrap();
        fs::write(project.join("Aaa.csproj"), "<Project />").unwrap();

        let found = find_project_file(&controllers.join("UsersController.cs")).unwrap();
        assert_eq!(found, project.join("Aaa.csproj"));
    }

    #[test]
    fn lookup_stops_after_ten_directories() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("Api");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("Api.csproj"), "<Project />").unwrap();

        let nested = |depth: usize| {
            let mut path = project.clone();
            for level in 0..depth {
                path.push(format!("d{level}"));
            }
            fs::create_dir_all(&path).unwrap();
            path.join("UsersController.cs")
        };

        assert_eq!(find_project_file(&nested(9)), Some(project.join("Api.csproj")));
        assert_eq!(find_project_file(&nested(10)), None);
    }

    #[test]
    fn missing_directory_stops_lookup() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("gone").join("UsersController.cs");
        assert_eq!(find_project_file(&source), None);
    }

    #[test]
    fn invalidation_maps_settings_file_to_project_dir() {
        let cache = ProjectConfigCache::new();
        cache
            .base_urls
            .lock()
            .unwrap()
            .insert(PathBuf::from("/repo/Api"), Some("http://localhost:5000".into()));
        assert!(!cache.invalidate_launch_settings(Path::new("/repo/Other/Properties/launchSettings.json")));
        assert!(cache.invalidate_launch_settings(Path::new("/repo/Api/Properties/launchSettings.json")));
        assert_eq!(cache.cached_base_url_count(), 0);
    }
}
