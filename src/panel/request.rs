//! Request URL assembly: route placeholders are filled from the query
//! entries they name and the rest become the query string.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::collections::HashSet;
use url::form_urlencoded;

use crate::analyzer::patterns::{self, ROUTE_PLACEHOLDER};

/// Characters left alone by a URI component encoder.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryEntry {
    pub key: String,
    pub value: String,
}

impl QueryEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub url: String,
    /// Route with placeholders filled.
    pub path: String,
    /// Encoded query string without `?`; also what history records.
    pub query: String,
}

/// Parses `a=1&b=2` (a leading `?` is ignored).
pub fn parse_query_string(input: &str) -> Vec<QueryEntry> {
    let input = input.trim();
    let input = input.strip_prefix('?').unwrap_or(input);
    form_urlencoded::parse(input.as_bytes())
        .map(|(key, value)| QueryEntry::new(key, value))
        .collect()
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Fills each `{name}` (also `{name:int}`, `{*name}`, `{name=1}`,
/// `{name?}`) with the first unconsumed entry whose key matches
/// case-insensitively. Returns the new route and the consumed indexes.
pub fn replace_route_placeholders(route: &str, entries: &[QueryEntry]) -> (String, HashSet<usize>) {
    let mut consumed = HashSet::new();
    let replaced = ROUTE_PLACEHOLDER.replace_all(route, |caps: &regex::Captures<'_>| {
        let whole = caps[0].to_string();
        let name = patterns::placeholder_name(&caps[1]);
        if name.is_empty() {
            return whole;
        }
        let found = entries
            .iter()
            .enumerate()
            .find(|(idx, entry)| !consumed.contains(idx) && entry.key.eq_ignore_ascii_case(name));
        match found {
            Some((idx, entry)) => {
                consumed.insert(idx);
                encode_component(&entry.value)
            }
            None => whole,
        }
    });
    (replaced.into_owned(), consumed)
}

pub fn build_request_url(base_url: &str, route: &str, entries: &[QueryEntry]) -> RequestUrl {
    let (path, consumed) = replace_route_placeholders(route, entries);
    let query = entries
        .iter()
        .enumerate()
        .filter(|(idx, _)| !consumed.contains(idx))
        .map(|(_, entry)| format!("{}={}", encode_component(&entry.key), encode_component(&entry.value)))
        .collect::<Vec<_>>()
        .join("&");
    let mut url = format!("{base_url}{path}");
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    RequestUrl { url, path, query }
}

/// `Authorization` value for a bearer token, keeping an existing prefix.
pub fn bearer_authorization(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.get(..7).is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer ")) {
        Some(token.to_string())
    } else {
        Some(format!("Bearer {token}"))
    }
}
