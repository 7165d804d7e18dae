use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::patterns;

/// Lines walked up from the method while looking for the controller class.
const VERSION_CLASS_LOOKBACK: usize = 50;
/// Lines scanned above the class for a version attribute.
const VERSION_ATTRIBUTE_LOOKBACK: usize = 20;
/// Lines scanned back when deciding whether a line sits in a block comment.
const BLOCK_COMMENT_LOOKBACK: usize = 10;

/// Inputs to one route composition.
#[derive(Debug, Clone, Copy)]
pub struct RouteInput<'a> {
    pub controller_route: Option<&'a str>,
    pub action_route: Option<&'a str>,
    pub controller: &'a str,
    pub action: &'a str,
    pub lines: &'a [&'a str],
    pub method_line: usize,
    pub file_path: &'a str,
}

/// Composes absolute route templates. Holds the per `(file, controller)`
/// version cache, so one builder should live as long as its analyzer.
#[derive(Debug)]
pub struct RouteBuilder {
    default_version: String,
    version_cache: Mutex<HashMap<(String, String), Option<String>>>,
    version_scans: AtomicUsize,
}

impl RouteBuilder {
    pub fn new(default_version: impl Into<String>) -> Self {
        Self {
            default_version: default_version.into(),
            version_cache: Mutex::new(HashMap::new()),
            version_scans: AtomicUsize::new(0),
        }
    }

    /// Number of version-attribute scans performed (cache misses).
    pub fn version_scans(&self) -> usize {
        self.version_scans.load(Ordering::Relaxed)
    }

    pub fn compose(&self, input: &RouteInput<'_>) -> String {
        let controller_route = input.controller_route.map(str::trim).unwrap_or("");
        let action_route = input.action_route.map(str::trim).unwrap_or("");
        let joined = join_route(controller_route, action_route);

        let controller_short = strip_suffix_ignore_case(input.controller, "Controller").to_lowercase();
        let action_short = strip_suffix_ignore_case(input.action, "Async").to_lowercase();
        let substituted = replace_token(&joined, "[controller]", &controller_short);
        let substituted = replace_token(&substituted, "[action]", &action_short);

        let resolved = self.resolve_version(&substituted, input);
        ensure_leading_slash(&resolved)
    }

    fn resolve_version(&self, route: &str, input: &RouteInput<'_>) -> String {
        if !patterns::has_version_placeholder(route) {
            return route.to_string();
        }
        let version = match self.version_for(input) {
            Some(version) => version,
            None if self.default_version.is_empty() => return route.to_string(),
            None => self.default_version.clone(),
        };
        patterns::VERSION_PLACEHOLDER
            .replace_all(route, regex::NoExpand(&version))
            .into_owned()
    }

    fn version_for(&self, input: &RouteInput<'_>) -> Option<String> {
        let key = (input.file_path.to_string(), input.controller.to_string());
        if let Ok(cache) = self.version_cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }
        self.version_scans.fetch_add(1, Ordering::Relaxed);
        let found = find_version_attribute(input.lines, input.method_line);
        debug!(file = input.file_path, controller = input.controller, version = ?found, "api version lookup");
        if let Ok(mut cache) = self.version_cache.lock() {
            cache.insert(key, found.clone());
        }
        found
    }
}

/// Joins controller and action fragments. An action fragment starting with
/// `/` or `~/` replaces the controller fragment.
fn join_route(controller_route: &str, action_route: &str) -> String {
    if let Some(absolute) = action_route.strip_prefix('~') {
        if absolute.starts_with('/') {
            return absolute.to_string();
        }
    }
    if action_route.starts_with('/') {
        return action_route.to_string();
    }
    match (controller_route.is_empty(), action_route.is_empty()) {
        (true, _) => action_route.to_string(),
        (false, true) => controller_route.to_string(),
        (false, false) => format!("{}/{}", controller_route.trim_end_matches('/'), action_route),
    }
}

fn ensure_leading_slash(route: &str) -> String {
    if route.is_empty() {
        "/".to_string()
    } else if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> &'a str {
    if value.len() > suffix.len() {
        let split = value.len() - suffix.len();
        if value.is_char_boundary(split) && value[split..].eq_ignore_ascii_case(suffix) {
            return &value[..split];
        }
    }
    value
}

/// Case-insensitive replacement of a bracketed token such as `[controller]`.
fn replace_token(route: &str, token: &str, value: &str) -> String {
    let lower = route.to_ascii_lowercase();
    let mut out = String::with_capacity(route.len());
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(token) {
        let start = cursor + pos;
        out.push_str(&route[cursor..start]);
        out.push_str(value);
        cursor = start + token.len();
    }
    out.push_str(&route[cursor..]);
    out
}

fn find_version_attribute(lines: &[&str], method_line: usize) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    let start = method_line.min(lines.len() - 1);
    let floor = start.saturating_sub(VERSION_CLASS_LOOKBACK);
    let class_line = (floor..=start)
        .rev()
        .find(|&i| patterns::controller_class(lines[i].trim()).is_some())?;

    let attr_floor = class_line.saturating_sub(VERSION_ATTRIBUTE_LOOKBACK);
    for j in (attr_floor..class_line).rev() {
        if is_commented_line(lines, j) {
            continue;
        }
        let line = lines[j].trim();
        if let Some(version) = patterns::api_version_attribute(line) {
            return Some(version.to_string());
        }
        if patterns::has_class_keyword(line) {
            break;
        }
    }
    None
}

/// True when the line starts a line comment or sits inside an open
/// `/* */` block within the look-back window.
fn is_commented_line(lines: &[&str], index: usize) -> bool {
    let trimmed = lines[index].trim();
    if trimmed.starts_with("//") || trimmed.starts_with("/*") {
        return true;
    }
    let floor = index.saturating_sub(BLOCK_COMMENT_LOOKBACK);
    for i in (floor..=index).rev() {
        let line = lines[i];
        let open = line.rfind("/*");
        let close = line.rfind("*/");
        match (open, close) {
            (Some(o), Some(c)) => return o > c,
            (Some(_), None) => return true,
            (None, Some(_)) => return false,
            (None, None) => {}
        }
    }
    false
}
