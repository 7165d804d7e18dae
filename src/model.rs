use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Any,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Any => "ANY",
        }
    }

    /// Maps an ASP.NET verb attribute name (`HttpGet`, `HttpPost`, ...) to a method.
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name.strip_prefix("Http")? {
            "Get" => Some(HttpMethod::Get),
            "Post" => Some(HttpMethod::Post),
            "Put" => Some(HttpMethod::Put),
            "Delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Verbs whose unannotated parameters bind from the query string.
    pub fn binds_from_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    Query,
    Body,
    Route,
    Header,
    Form,
    Services,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: ParameterSource,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    Json,
    Formdata,
    Binary,
}

impl Default for BodyMode {
    fn default() -> Self {
        BodyMode::Json
    }
}

/// One detected HTTP route handler. Only `project_path` and `full_url` are
/// filled in after detection, by panel enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub http_method: HttpMethod,
    pub route_template: String,
    pub controller: String,
    pub action: String,
    pub file_path: String,
    pub line_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_query_param_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_body_mode: Option<BodyMode>,
}

impl EndpointDescriptor {
    /// Sets `full_url` from a resolved base URL, falling back to the bare
    /// route template.
    pub fn attach_base_url(&mut self, base_url: Option<&str>) {
        self.full_url = Some(match base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), self.route_template),
            None => self.route_template.clone(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHistoryItem {
    pub id: String,
    pub query: String,
    pub body: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub status_code: Option<u16>,
}
