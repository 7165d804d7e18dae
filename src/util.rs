use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Strips a UTF-8 byte order mark and whole-line `//` comments, which both
/// launchSettings.json and VS Code settings files tolerate.
pub fn strip_json_comments(content: &str) -> String {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Forward-slash, lower-cased rendering of a path so that the same project
/// reached through case or separator variants maps to one key.
pub fn normalize_path_key(path: &str) -> String {
    let mut value = path.trim().replace('\\', "/");
    while value.len() > 1 && value.ends_with('/') {
        value.pop();
    }
    value.to_lowercase()
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    Ok(())
}

/// Writes through a sibling temp file and renames it into place.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn truncate_str_bytes(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes.min(value.len());
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_line_comments() {
        let raw = "\u{feff}{\n  // profile comment\n  \"a\": 1\n}";
        assert_eq!(strip_json_comments(raw), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn path_keys_collapse_case_and_separators() {
        assert_eq!(
            normalize_path_key(r"C:\Src\Api\Api.csproj"),
            normalize_path_key("c:/src/api/API.csproj")
        );
        assert_eq!(normalize_path_key("/repo/app/"), "/repo/app");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str_bytes("héllo", 2), "h");
        assert_eq!(truncate_str_bytes("abc", 10), "abc");
    }
}
