use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

use crate::util;

const PROJECT_COMMAND: &str = "Project";
const LOOPBACK_HOST: &str = "localhost";

pub fn settings_path(project_file: &Path) -> Option<PathBuf> {
    Some(
        project_file
            .parent()?
            .join("Properties")
            .join("launchSettings.json"),
    )
}

/// Base URL of the first `"commandName": "Project"` profile, preferring an
/// `http://` application URL over `https://`. Wildcard bind hosts become
/// `localhost`. Any failure yields `None`.
pub fn base_url(project_file: &Path) -> Option<String> {
    match project_profile(project_file) {
        Ok(Some(profile)) => {
            let raw = profile.get("applicationUrl")?.as_str()?;
            choose_application_url(raw)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(project = %project_file.display(), "failed to read launch settings: {err:#}");
            None
        }
    }
}

/// Environment variables of the project profile, values stringified.
pub fn environment_variables(project_file: &Path) -> BTreeMap<String, String> {
    let profile = match project_profile(project_file) {
        Ok(Some(profile)) => profile,
        Ok(None) => return BTreeMap::new(),
        Err(err) => {
            warn!(project = %project_file.display(), "failed to read launch settings: {err:#}");
            return BTreeMap::new();
        }
    };
    let Some(vars) = profile.get("environmentVariables").and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    vars.iter()
        .filter(|(key, _)| !key.is_empty())
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn project_profile(project_file: &Path) -> Result<Option<Map<String, Value>>> {
    let Some(path) = settings_path(project_file) else {
        return Ok(None);
    };
    if !path.is_file() {
        return Ok(None);
    }
    let raw = util::read_to_string(&path)?;
    let json: Value = serde_json::from_str(&util::strip_json_comments(&raw))
        .with_context(|| format!("parse {}", path.display()))?;
    let profile = json
        .get("profiles")
        .and_then(Value::as_object)
        .and_then(|profiles| {
            profiles.values().find(|profile| {
                profile.get("commandName").and_then(Value::as_str) == Some(PROJECT_COMMAND)
            })
        })
        .and_then(Value::as_object)
        .cloned();
    Ok(profile)
}

/// Picks and normalizes one entry of a `;`-separated `applicationUrl`.
pub fn choose_application_url(raw: &str) -> Option<String> {
    let urls: Vec<&str> = raw.split(';').map(str::trim).filter(|u| !u.is_empty()).collect();
    let chosen = urls
        .iter()
        .find(|u| u.starts_with("http://"))
        .or_else(|| urls.iter().find(|u| u.starts_with("https://")))?;
    normalize_host(chosen)
}

fn normalize_host(raw: &str) -> Option<String> {
    // `url` rejects `*` and `+` hosts, which Kestrel accepts as wildcards.
    let (scheme, rest) = raw.split_once("://")?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let authority = if authority.starts_with('*') || authority.starts_with('+') {
        format!("{LOOPBACK_HOST}{}", &authority[1..])
    } else {
        authority.to_string()
    };
    let mut url = Url::parse(&format!("{scheme}://{authority}{path}")).ok()?;

    let keep = match url.host_str() {
        Some(LOOPBACK_HOST) => true,
        Some(host) => is_real_ipv4(host),
        None => false,
    };
    if !keep {
        url.set_host(Some(LOOPBACK_HOST)).ok()?;
    }
    Some(url.as_str().trim_end_matches('/').to_string())
}

fn is_real_ipv4(host: &str) -> bool {
    host.parse::<Ipv4Addr>()
        .is_ok_and(|ip| !ip.is_unspecified())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_http_over_https() {
        assert_eq!(
            choose_application_url("https://localhost:5001;http://localhost:5000").as_deref(),
            Some("http://localhost:5000")
        );
        assert_eq!(
            choose_application_url(" https://localhost:5001 ").as_deref(),
            Some("https://localhost:5001")
        );
        assert_eq!(choose_application_url("ftp://host"), None);
        assert_eq!(choose_application_url(""), None);
    }

    #[test]
    fn wildcard_hosts_become_localhost() {
        assert_eq!(
            choose_application_url("http://0.0.0.0:5000").as_deref(),
            Some("http://localhost:5000")
        );
        assert_eq!(
            choose_application_url("http://*:8080").as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(
            choose_application_url("http://+:80").as_deref(),
            Some("http://localhost")
        );
        assert_eq!(
            choose_application_url("http://[::]:5000").as_deref(),
            Some("http://localhost:5000")
        );
    }

    #[test]
    fn real_ipv4_hosts_are_kept() {
        assert_eq!(
            choose_application_url("http://127.0.0.1:5000/").as_deref(),
            Some("http://127.0.0.1:5000")
        );
        assert_eq!(
            choose_application_url("http://192.168.1.20:7000").as_deref(),
            Some("http://192.168.1.20:7000")
        );
    }
}
