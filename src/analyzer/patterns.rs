//! Independent line recognizers. Each takes one source line and returns an
//! optional structured match; the analyzer composes them through bounded
//! scans.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::HttpMethod;

static METHOD_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:public|private|protected|internal)\s+(?:(?:static|virtual|override|new|sealed|abstract|extern|unsafe)\s+)*(?:async\s+)?(?:(?:Task|ValueTask)<)?[\w<>?\[\].,]+>?\s+(\w+)\s*\(",
    )
    .expect("hardcoded regex")
});

static CONTROLLER_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(\w+Controller)\b").expect("hardcoded regex"));

static CLASS_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\b").expect("hardcoded regex"));

static ROUTE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bRoute\s*\(\s*"([^"]+)"\s*[,)]"#).expect("hardcoded regex")
});

static VERB_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(HttpGet|HttpPost|HttpPut|HttpDelete)\b(?:\s*\(\s*"([^"]*)")?"#)
        .expect("hardcoded regex")
});

static API_VERSION_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\[\s*ApiVersion\s*\(\s*["']([\d.]+)["']"#).expect("hardcoded regex")
});

pub(crate) static VERSION_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\w+:apiVersion\}").expect("hardcoded regex"));

pub(crate) static ROUTE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("hardcoded regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    /// Character column where the method name starts.
    pub name_column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbAttribute {
    pub method: HttpMethod,
    pub route: Option<String>,
}

pub fn method_signature(line: &str) -> Option<MethodSignature> {
    let caps = METHOD_SIGNATURE.captures(line)?;
    let name = caps.get(1)?;
    Some(MethodSignature {
        name: name.as_str().to_string(),
        name_column: line[..name.start()].chars().count(),
    })
}

pub fn is_method_signature(line: &str) -> bool {
    METHOD_SIGNATURE.is_match(line)
}

pub fn controller_class(line: &str) -> Option<&str> {
    CONTROLLER_CLASS
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn has_class_keyword(line: &str) -> bool {
    CLASS_KEYWORD.is_match(line)
}

pub fn route_attribute(line: &str) -> Option<&str> {
    ROUTE_ATTRIBUTE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// First verb attribute on the line. An empty inline route (`[HttpGet("")]`)
/// counts as no route.
pub fn verb_attribute(line: &str) -> Option<VerbAttribute> {
    let caps = VERB_ATTRIBUTE.captures(line)?;
    let method = HttpMethod::from_attribute(caps.get(1)?.as_str())?;
    let route = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(VerbAttribute { method, route })
}

pub fn api_version_attribute(line: &str) -> Option<&str> {
    API_VERSION_ATTRIBUTE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn has_version_placeholder(route: &str) -> bool {
    VERSION_PLACEHOLDER.is_match(route)
}

/// Lines that open or continue a comment: `//`, `/*`, or a `*` continuation.
pub fn is_comment_line(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

/// Parameter name of one placeholder body: `id:int` -> `id`,
/// `*path` -> `path`, `page=1` -> `page`, `id?` -> `id`.
pub fn placeholder_name(content: &str) -> &str {
    let raw = content.trim();
    let raw = raw.split(':').next().unwrap_or(raw);
    let raw = raw.split('=').next().unwrap_or(raw);
    raw.trim_start_matches('*').trim_end_matches('?').trim()
}

pub fn route_placeholder_names(route: &str) -> Vec<String> {
    ROUTE_PLACEHOLDER
        .captures_iter(route)
        .filter_map(|caps| caps.get(1))
        .map(|m| placeholder_name(m.as_str()).to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
