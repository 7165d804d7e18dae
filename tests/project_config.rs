use api_console::base_urls::BaseUrlConfigManager;
use api_console::launch_settings;
use api_console::project::{self, ProjectConfigCache};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

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

fn copy_dir(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&path, &target);
        } else {
            std::fs::copy(&path, &target).unwrap();
        }
    }
}

fn setup_repo(fixture: &str) -> PathBuf {
    let repo_root = temp_repo_dir(fixture);
    copy_dir(&fixture_path(fixture), &repo_root);
    repo_root
}

fn write_launch_settings(project_dir: &Path, application_url: &str) {
    let body = format!(
        r#"{{"profiles": {{"Api": {{"commandName": "Project", "applicationUrl": "{application_url}"}}}}}}"#
    );
    std::fs::write(project_dir.join("Properties").join("launchSettings.json"), body).unwrap();
}

#[test]
fn project_file_found_from_nested_source() {
    let repo_root = setup_repo("webapi");
    let source = repo_root.join("Api").join("Controllers").join("UsersController.cs");

    let project_file = project::find_project_file(&source).unwrap();
    assert_eq!(project_file, repo_root.join("Api").join("Api.csproj"));
    assert_eq!(project::find_project_file(&repo_root.join("README.md")), None);

    let _ = std::fs::remove_dir_all(&repo_root);
}

#[test]
fn base_url_uses_project_profile_and_rewrites_wildcard_host() {
    let repo_root = setup_repo("webapi");
    let source = repo_root.join("Api").join("Controllers").join("UsersController.cs");
    let cache = ProjectConfigCache::new();

    assert_eq!(cache.resolve_base_url(&source).as_deref(), Some("http://localhost:5000"));
    assert_eq!(cache.project_dir(&source), Some(repo_root.join("Api")));
    assert_eq!(cache.cached_base_url_count(), 1);

    let project_file = repo_root.join("Api").join("Api.csproj");
    let env = launch_settings::environment_variables(&project_file);
    assert_eq!(env.get("ASPNETCORE_ENVIRONMENT").map(String::as_str), Some("Development"));
    assert_eq!(env.get("FEATURE_LEVEL").map(String::as_str), Some("3"));

    let _ = std::fs::remove_dir_all(&repo_root);
}

#[test]
fn base_url_is_cached_until_launch_settings_invalidated() {
    let repo_root = setup_repo("webapi");
    let project_dir = repo_root.join("Api");
    let source = project_dir.join("Controllers").join("UsersController.cs");
    let cache = ProjectConfigCache::new();

    assert_eq!(cache.resolve_base_url(&source).as_deref(), Some("http://localhost:5000"));

    write_launch_settings(&project_dir, "http://localhost:6100");
    assert_eq!(cache.resolve_base_url(&source).as_deref(), Some("http://localhost:5000"));

    let settings_path = project_dir.join("Properties").join("launchSettings.json");
    assert!(cache.invalidate_launch_settings(&settings_path));
    assert!(!cache.invalidate_launch_settings(&settings_path));
    assert_eq!(cache.resolve_base_url(&source).as_deref(), Some("http://localhost:6100"));
    assert_eq!(cache.project_dir(&source), Some(project_dir.clone()));

    let _ = std::fs::remove_dir_all(&repo_root);
}

#[test]
fn missing_launch_settings_resolves_to_none_and_is_cached() {
    let repo_root = setup_repo("webapi");
    let project_dir = repo_root.join("Api");
    let settings_path = project_dir.join("Properties").join("launchSettings.json");
    std::fs::remove_file(&settings_path).unwrap();
    let source = project_dir.join("Controllers").join("ItemsController.cs");
    let cache = ProjectConfigCache::new();

    assert_eq!(cache.resolve_base_url(&source), None);
    assert_eq!(cache.cached_base_url_count(), 1);

    write_launch_settings(&project_dir, "https://localhost:7443");
    assert_eq!(cache.resolve_base_url(&source), None);
    cache.invalidate_launch_settings(&settings_path);
    assert_eq!(cache.resolve_base_url(&source).as_deref(), Some("https://localhost:7443"));

    cache.clear_all();
    assert_eq!(cache.cached_base_url_count(), 0);

    let _ = std::fs::remove_dir_all(&repo_root);
}

#[test]
fn saved_base_urls_survive_reopen() {
    let repo_root = setup_repo("webapi");
    let project = repo_root.join("Api").join("Api.csproj");
    let project = project.to_string_lossy().to_string();

    let manager = BaseUrlConfigManager::open_workspace(&repo_root);
    manager.save_base_urls(
        &project,
        &[
            " http://localhost:5000 ".to_string(),
            "https://staging.example.com".to_string(),
            "http://localhost:5000".to_string(),
        ],
    );
    assert_eq!(
        manager.get_base_urls(&project),
        vec!["http://localhost:5000", "https://staging.example.com"]
    );
    let config_path = manager.path().to_path_buf();
    manager.dispose();
    assert!(config_path.starts_with(repo_root.join(".vscode")));

    let reopened = BaseUrlConfigManager::new(config_path, Duration::from_millis(10));
    assert_eq!(
        reopened.get_base_urls(&project),
        vec!["http://localhost:5000", "https://staging.example.com"]
    );
    assert!(reopened.get_base_urls("other.csproj").is_empty());

    let _ = std::fs::remove_dir_all(&repo_root);
}
