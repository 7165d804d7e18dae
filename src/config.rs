// Settings for the api console.
// Defaults, then `<workspace>/.vscode/settings.json` (`csharpApiConsole.*`),
// then API_CONSOLE_* environment variables.

use serde_json::Value;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::i18n::Language;
use crate::util;

const SETTINGS_PREFIX: &str = "csharpApiConsole.";
const HISTORY_LIMIT_MIN: usize = 1;
const HISTORY_LIMIT_MAX: usize = 20;
const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Substituted for `{x:apiVersion}` when no `[ApiVersion]` attribute is
    /// found. Empty leaves the placeholder in place (API_CONSOLE_DEFAULT_API_VERSION)
    pub default_api_version: String,

    /// Record sent requests per endpoint (API_CONSOLE_REQUEST_HISTORY_ENABLED)
    pub request_history_enabled: bool,

    /// Items kept per endpoint, clamped to 1..=20 (API_CONSOLE_REQUEST_HISTORY_LIMIT)
    pub request_history_limit: usize,

    /// Outbound request timeout (API_CONSOLE_REQUEST_TIMEOUT_SECS)
    pub request_timeout_secs: u64,

    /// Responses above this size render without highlighting (API_CONSOLE_LARGE_RESPONSE_THRESHOLD_KB)
    pub large_response_threshold_kb: u64,

    /// Line-number gutter cap in the response view (API_CONSOLE_MAX_RENDERED_LINE_NUMBERS)
    pub max_rendered_line_numbers: u64,

    /// Request bodies above this size are stored empty; 0 = no limit (API_CONSOLE_HISTORY_MAX_BODY_SIZE_KB)
    pub history_max_body_size_kb: u64,

    /// History retention in days; 0 disables pruning (API_CONSOLE_HISTORY_TTL_DAYS)
    pub history_ttl_days: Option<u64>,

    /// Legacy retention in seconds, used only when days is unset (API_CONSOLE_HISTORY_TTL_SECONDS)
    pub history_ttl_seconds: Option<u64>,

    /// Code lens re-scan debounce; 0 scans synchronously (API_CONSOLE_CODELENS_DEBOUNCE_MS)
    pub code_lens_debounce_ms: u64,

    /// Idle time before a cached lens set expires; 0 disables (API_CONSOLE_CODELENS_CACHE_TTL_SECS)
    pub code_lens_cache_ttl_secs: u64,

    /// Documents kept in the lens cache; 0 = unbounded (API_CONSOLE_CODELENS_CACHE_MAX_ENTRIES)
    pub code_lens_cache_max_entries: usize,

    /// UI language override (API_CONSOLE_LANGUAGE), falls back to LANG
    pub language: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_api_version: "1.0".to_string(),
            request_history_enabled: true,
            request_history_limit: 10,
            request_timeout_secs: 30,
            large_response_threshold_kb: 512,
            max_rendered_line_numbers: 2000,
            history_max_body_size_kb: 64,
            history_ttl_days: None,
            history_ttl_seconds: None,
            code_lens_debounce_ms: 300,
            code_lens_cache_ttl_secs: 300,
            code_lens_cache_max_entries: 100,
            language: None,
        }
    }
}

impl Settings {
    /// Loads settings for a workspace. A missing or malformed settings file
    /// leaves the defaults in place.
    pub fn load(workspace_root: &Path) -> Self {
        let mut settings = Settings::default();
        let path = workspace_root.join(".vscode").join("settings.json");
        if path.is_file() {
            match util::read_to_string(&path)
                .and_then(|raw| Ok(serde_json::from_str::<Value>(&util::strip_json_comments(&raw))?))
            {
                Ok(value) => settings.apply_settings_file(&value),
                Err(err) => warn!(path = %path.display(), "ignoring settings file: {err:#}"),
            }
        }
        settings.apply_env_with(|key| env::var(key).ok());
        settings
    }

    /// Applies `csharpApiConsole.*` keys from a parsed VS Code settings
    /// document. Both flat (`"csharpApiConsole.x": ..`) and nested
    /// (`"csharpApiConsole": {"x": ..}`) shapes are accepted.
    pub fn apply_settings_file(&mut self, value: &Value) {
        let Some(object) = value.as_object() else {
            return;
        };
        let nested = object
            .get(SETTINGS_PREFIX.trim_end_matches('.'))
            .and_then(Value::as_object);
        let lookup = |name: &str| {
            object
                .get(&format!("{SETTINGS_PREFIX}{name}"))
                .or_else(|| nested.and_then(|n| n.get(name)))
        };

        if let Some(v) = lookup("defaultApiVersion") {
            match v.as_str() {
                Some(s) => self.default_api_version = s.to_string(),
                None => warn_invalid("defaultApiVersion", v),
            }
        }
        if let Some(v) = lookup("requestHistoryEnabled") {
            match v.as_bool() {
                Some(b) => self.request_history_enabled = b,
                None => warn_invalid("requestHistoryEnabled", v),
            }
        }
        if let Some(v) = lookup("requestHistoryLimit") {
            match json_u64(v) {
                Some(n) => self.request_history_limit = clamp_history_limit(n as usize),
                None => warn_invalid("requestHistoryLimit", v),
            }
        }
        set_u64(lookup("requestTimeoutSeconds"), "requestTimeoutSeconds", &mut self.request_timeout_secs);
        set_u64(
            lookup("largeResponseThresholdKb"),
            "largeResponseThresholdKb",
            &mut self.large_response_threshold_kb,
        );
        set_u64(
            lookup("maxRenderedLineNumbers"),
            "maxRenderedLineNumbers",
            &mut self.max_rendered_line_numbers,
        );
        set_u64(
            lookup("historyMaxBodySizeKb"),
            "historyMaxBodySizeKb",
            &mut self.history_max_body_size_kb,
        );
        set_opt_u64(lookup("historyTtlDays"), "historyTtlDays", &mut self.history_ttl_days);
        set_opt_u64(lookup("historyTtlSeconds"), "historyTtlSeconds", &mut self.history_ttl_seconds);
        set_u64(lookup("codeLensDebounceDelay"), "codeLensDebounceDelay", &mut self.code_lens_debounce_ms);
        set_u64(
            lookup("codeLensCacheTtlSeconds"),
            "codeLensCacheTtlSeconds",
            &mut self.code_lens_cache_ttl_secs,
        );
        if let Some(v) = lookup("codeLensCacheMaxEntries") {
            match json_u64(v) {
                Some(n) => self.code_lens_cache_max_entries = n as usize,
                None => warn_invalid("codeLensCacheMaxEntries", v),
            }
        }
        if let Some(v) = lookup("language") {
            match v.as_str() {
                Some(s) if !s.trim().is_empty() => self.language = Some(s.trim().to_string()),
                Some(_) => {}
                None => warn_invalid("language", v),
            }
        }
    }

    /// Applies API_CONSOLE_* overrides read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("API_CONSOLE_DEFAULT_API_VERSION") {
            self.default_api_version = val;
        }
        env_parse(&lookup, "API_CONSOLE_REQUEST_HISTORY_ENABLED", &mut self.request_history_enabled);
        let mut limit = self.request_history_limit;
        env_parse(&lookup, "API_CONSOLE_REQUEST_HISTORY_LIMIT", &mut limit);
        self.request_history_limit = clamp_history_limit(limit);
        env_parse(&lookup, "API_CONSOLE_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_parse(
            &lookup,
            "API_CONSOLE_LARGE_RESPONSE_THRESHOLD_KB",
            &mut self.large_response_threshold_kb,
        );
        env_parse(
            &lookup,
            "API_CONSOLE_MAX_RENDERED_LINE_NUMBERS",
            &mut self.max_rendered_line_numbers,
        );
        env_parse(
            &lookup,
            "API_CONSOLE_HISTORY_MAX_BODY_SIZE_KB",
            &mut self.history_max_body_size_kb,
        );
        env_parse_opt(&lookup, "API_CONSOLE_HISTORY_TTL_DAYS", &mut self.history_ttl_days);
        env_parse_opt(&lookup, "API_CONSOLE_HISTORY_TTL_SECONDS", &mut self.history_ttl_seconds);
        env_parse(&lookup, "API_CONSOLE_CODELENS_DEBOUNCE_MS", &mut self.code_lens_debounce_ms);
        env_parse(&lookup, "API_CONSOLE_CODELENS_CACHE_TTL_SECS", &mut self.code_lens_cache_ttl_secs);
        env_parse(
            &lookup,
            "API_CONSOLE_CODELENS_CACHE_MAX_ENTRIES",
            &mut self.code_lens_cache_max_entries,
        );
        if let Some(val) = lookup("API_CONSOLE_LANGUAGE") {
            if !val.trim().is_empty() {
                self.language = Some(val.trim().to_string());
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn code_lens_debounce(&self) -> Duration {
        Duration::from_millis(self.code_lens_debounce_ms)
    }

    pub fn code_lens_cache_ttl(&self) -> Option<Duration> {
        (self.code_lens_cache_ttl_secs > 0).then(|| Duration::from_secs(self.code_lens_cache_ttl_secs))
    }

    /// Retention window for request history. Days win over the legacy
    /// seconds key; zero or unset disables pruning.
    pub fn history_ttl(&self) -> Option<Duration> {
        let secs = match (self.history_ttl_days, self.history_ttl_seconds) {
            (Some(days), _) => days.saturating_mul(SECS_PER_DAY),
            (None, Some(secs)) => secs,
            (None, None) => 0,
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Body budget in bytes; `None` means unlimited.
    pub fn history_max_body_bytes(&self) -> Option<usize> {
        (self.history_max_body_size_kb > 0).then(|| (self.history_max_body_size_kb as usize) * 1024)
    }

    pub fn large_response_threshold_bytes(&self) -> u64 {
        self.large_response_threshold_kb.saturating_mul(1024)
    }

    pub fn ui_language(&self) -> Language {
        match &self.language {
            Some(lang) => Language::from_tag(lang),
            None => Language::from_tag(&env::var("LANG").unwrap_or_default()),
        }
    }
}

fn clamp_history_limit(limit: usize) -> usize {
    limit.clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX)
}

fn json_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn set_u64(value: Option<&Value>, name: &str, slot: &mut u64) {
    if let Some(v) = value {
        match json_u64(v) {
            Some(n) => *slot = n,
            None => warn_invalid(name, v),
        }
    }
}

fn set_opt_u64(value: Option<&Value>, name: &str, slot: &mut Option<u64>) {
    match value {
        None | Some(Value::Null) => {}
        Some(v) => match json_u64(v) {
            Some(n) => *slot = Some(n),
            None => warn_invalid(name, v),
        },
    }
}

fn warn_invalid(name: &str, value: &Value) {
    warn!("invalid {SETTINGS_PREFIX}{name} value: {value}, keeping previous value");
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    if let Some(val) = lookup(key) {
        match val.trim().parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!("invalid {key} value: {val}, using: {slot}"),
        }
    }
}

fn env_parse_opt(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut Option<u64>) {
    if let Some(val) = lookup(key) {
        match val.trim().parse() {
            Ok(parsed) => *slot = Some(parsed),
            Err(_) => warn!("invalid {key} value: {val}, ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_api_version, "1.0");
        assert!(settings.request_history_enabled);
        assert_eq!(settings.request_history_limit, 10);
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.code_lens_debounce(), Duration::from_millis(300));
        assert_eq!(settings.code_lens_cache_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(settings.code_lens_cache_max_entries, 100);
        assert_eq!(settings.history_max_body_bytes(), Some(64 * 1024));
        assert_eq!(settings.history_ttl(), None);
    }

    #[test]
    fn settings_file_keys_apply_and_clamp() {
        let mut settings = Settings::default();
        settings.apply_settings_file(&json!({
            "csharpApiConsole.defaultApiVersion": "",
            "csharpApiConsole.requestHistoryLimit": 50,
            "csharpApiConsole.codeLensDebounceDelay": 0,
            "csharpApiConsole.requestTimeoutSeconds": "soon",
            "editor.fontSize": 14
        }));
        assert_eq!(settings.default_api_version, "");
        assert_eq!(settings.request_history_limit, 20);
        assert_eq!(settings.code_lens_debounce_ms, 0);
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn nested_settings_shape_is_accepted() {
        let mut settings = Settings::default();
        settings.apply_settings_file(&json!({
            "csharpApiConsole": { "historyTtlDays": 7, "language": "zh-CN" }
        }));
        assert_eq!(settings.history_ttl_days, Some(7));
        assert_eq!(settings.ui_language(), Language::ZhCn);
    }

    #[test]
    fn history_ttl_prefers_days_over_legacy_seconds() {
        let mut settings = Settings::default();
        settings.history_ttl_seconds = Some(90);
        assert_eq!(settings.history_ttl(), Some(Duration::from_secs(90)));

        settings.history_ttl_days = Some(2);
        assert_eq!(settings.history_ttl(), Some(Duration::from_secs(2 * SECS_PER_DAY)));

        settings.history_ttl_days = Some(0);
        assert_eq!(settings.history_ttl(), None);
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("API_CONSOLE_REQUEST_HISTORY_LIMIT", "0"),
            ("API_CONSOLE_CODELENS_CACHE_MAX_ENTRIES", "many"),
            ("API_CONSOLE_HISTORY_MAX_BODY_SIZE_KB", "0"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env_with(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(settings.request_history_limit, 1);
        assert_eq!(settings.code_lens_cache_max_entries, 100);
        assert_eq!(settings.history_max_body_bytes(), None);
    }
}
