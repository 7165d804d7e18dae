//! Line-oriented reconstruction of ASP.NET controller routes.
//!
//! Recognizers in [`patterns`] match single lines; the analyzer composes them
//! with bounded upward scans from a method signature. Misses are
//! classification outcomes, not errors.

pub mod params;
pub mod patterns;
pub mod route;

use thiserror::Error;
use tracing::debug;

use crate::config::Settings;
use crate::document::SourceDocument;
use crate::model::{EndpointDescriptor, HttpMethod};
use crate::project;
use patterns::MethodSignature;
pub use route::{RouteBuilder, RouteInput};

/// Lines above a controller class searched for its `[Route]`.
const CONTROLLER_ROUTE_LOOKBACK: usize = 10;
/// Lines above a method searched for verb and route attributes.
const ATTRIBUTE_LOOKBACK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Miss {
    #[error("line is not a method signature")]
    NotAMethod,
    #[error("no enclosing controller class")]
    NoController,
    #[error("method has no HTTP verb attribute")]
    NotAnApiMethod,
}

/// An endpoint found while scanning a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedEndpoint {
    pub endpoint: EndpointDescriptor,
    /// 0-based line of the method signature.
    pub line: usize,
    /// Character column of the method name.
    pub column: usize,
}

#[derive(Debug)]
pub struct EndpointAnalyzer {
    routes: RouteBuilder,
}

struct ControllerInfo<'a> {
    name: &'a str,
    route: Option<&'a str>,
}

struct ActionAttributes {
    method: HttpMethod,
    route: Option<String>,
}

impl EndpointAnalyzer {
    pub fn new(default_api_version: impl Into<String>) -> Self {
        Self {
            routes: RouteBuilder::new(default_api_version),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.default_api_version.clone())
    }

    pub fn routes(&self) -> &RouteBuilder {
        &self.routes
    }

    /// Classifies the method declared on `line_index` (0-based). Pure; the
    /// project path is left unset.
    pub fn detect(
        &self,
        lines: &[&str],
        line_index: usize,
        file_path: &str,
    ) -> Result<EndpointDescriptor, Miss> {
        let line = lines.get(line_index).ok_or(Miss::NotAMethod)?;
        let signature = patterns::method_signature(line).ok_or(Miss::NotAMethod)?;
        let controller = find_controller(lines, line_index).ok_or(Miss::NoController)?;
        let attributes =
            find_action_attributes(lines, line_index, controller.route).ok_or(Miss::NotAnApiMethod)?;

        let route_template = self.routes.compose(&RouteInput {
            controller_route: controller.route,
            action_route: attributes.route.as_deref(),
            controller: controller.name,
            action: &signature.name,
            lines,
            method_line: line_index,
            file_path,
        });

        let placeholders = patterns::route_placeholder_names(&route_template);
        let summary = params::classify(lines, line_index, attributes.method, &placeholders);

        Ok(EndpointDescriptor {
            http_method: attributes.method,
            route_template,
            controller: controller.name.to_string(),
            action: signature.name,
            file_path: file_path.to_string(),
            line_number: line_index + 1,
            project_path: None,
            full_url: None,
            auto_query_param_names: (!summary.auto_query_names.is_empty())
                .then_some(summary.auto_query_names),
            parameters: summary.parameters,
            preferred_body_mode: summary.preferred_body_mode,
        })
    }

    /// [`detect`](Self::detect) plus the owning project file lookup.
    pub fn detect_endpoint(
        &self,
        document: &SourceDocument,
        line_index: usize,
    ) -> Result<EndpointDescriptor, Miss> {
        let lines = document.lines();
        let mut endpoint = self.detect(&lines, line_index, &document.file_path)?;
        endpoint.project_path = project::find_project_file(std::path::Path::new(&document.file_path))
            .map(|p| p.to_string_lossy().to_string());
        Ok(endpoint)
    }

    /// Every endpoint in the document, in line order.
    pub fn scan_document(&self, document: &SourceDocument) -> Vec<DetectedEndpoint> {
        let lines = document.lines();
        let mut found = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let Some(MethodSignature { name_column, .. }) = patterns::method_signature(line) else {
                continue;
            };
            match self.detect(&lines, idx, &document.file_path) {
                Ok(endpoint) => found.push(DetectedEndpoint {
                    endpoint,
                    line: idx,
                    column: name_column,
                }),
                Err(miss) => debug!(file = %document.file_path, line = idx + 1, "skipped: {miss}"),
            }
        }
        found
    }
}

fn find_controller<'a>(lines: &[&'a str], method_line: usize) -> Option<ControllerInfo<'a>> {
    for i in (0..=method_line).rev() {
        let Some(name) = patterns::controller_class(lines[i]) else {
            continue;
        };
        let floor = i.saturating_sub(CONTROLLER_ROUTE_LOOKBACK);
        let route = (floor..i)
            .rev()
            .find_map(|j| patterns::route_attribute(lines[j].trim()));
        return Some(ControllerInfo { name, route });
    }
    None
}

fn find_action_attributes(
    lines: &[&str],
    method_line: usize,
    controller_route: Option<&str>,
) -> Option<ActionAttributes> {
    let mut method = None;
    let mut route: Option<String> = None;
    let floor = method_line.saturating_sub(ATTRIBUTE_LOOKBACK);

    for i in (floor..method_line).rev() {
        let line = lines[i].trim();
        if line.is_empty() || patterns::is_comment_line(line) {
            continue;
        }
        if patterns::is_method_signature(line) || patterns::has_class_keyword(line) || line.starts_with('}') {
            break;
        }
        if let Some(verb) = patterns::verb_attribute(line) {
            method = Some(verb.method);
            if verb.route.is_some() {
                route = verb.route;
            }
        }
        if route.is_none() {
            route = patterns::route_attribute(line).map(str::to_string);
        }
    }

    let method = match method {
        Some(method) => method,
        None if controller_route.is_some_and(|r| r.to_ascii_lowercase().contains("[action]")) => {
            HttpMethod::Any
        }
        None => return None,
    };
    Some(ActionAttributes { method, route })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterSource;

    const USERS: &str = r#"using Microsoft.AspNetCore.Mvc;

[ApiController]
[Route("api/[controller]")]
public class UsersController : ControllerBase
{
    [HttpGet("{id}")]
    public IActionResult Get(int id)
    {
        return Ok();
    }

    // [HttpDelete]
    [HttpPost]
    [Route("import")]
    public async Task<IActionResult> ImportAsync([FromBody] ImportRequest request)
    {
        return Ok();
    }

    private void Helper()
    {
    }
}
"#;

    #[test]
    fn detects_verb_and_inline_route() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let lines: Vec<&str> = USERS.lines().collect();
        let endpoint = analyzer.detect(&lines, 7, "/src/UsersController.cs").unwrap();
        assert_eq!(endpoint.http_method, HttpMethod::Get);
        assert_eq!(endpoint.route_template, "/api/users/{id}");
        assert_eq!(endpoint.line_number, 8);
        assert_eq!(endpoint.parameters[0].source, ParameterSource::Route);
        assert_eq!(endpoint.auto_query_param_names, None);
    }

    #[test]
    fn route_attribute_fills_action_route() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let lines: Vec<&str> = USERS.lines().collect();
        let endpoint = analyzer.detect(&lines, 15, "/src/UsersController.cs").unwrap();
        assert_eq!(endpoint.http_method, HttpMethod::Post);
        assert_eq!(endpoint.route_template, "/api/users/import");
        assert_eq!(endpoint.action, "ImportAsync");
    }

    #[test]
    fn misses_are_classified() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let lines: Vec<&str> = USERS.lines().collect();
        assert_eq!(analyzer.detect(&lines, 0, "f.cs"), Err(Miss::NotAMethod));
        assert_eq!(analyzer.detect(&lines, 20, "f.cs"), Err(Miss::NotAnApiMethod));
        assert_eq!(analyzer.detect(&lines, 999, "f.cs"), Err(Miss::NotAMethod));

        let orphan = ["public IActionResult Get()"];
        assert_eq!(analyzer.detect(&orphan, 0, "f.cs"), Err(Miss::NoController));
    }

    #[test]
    fn uppermost_verb_wins_and_inline_route_overrides() {
        let lines = [
            "public class ItemsController",
            "{",
            r#"    [HttpPut("first")]"#,
            r#"    [Route("ignored")]"#,
            r#"    [HttpPost("second")]"#,
            "    public IActionResult Save()",
        ];
        let analyzer = EndpointAnalyzer::new("1.0");
        let endpoint = analyzer.detect(&lines, 5, "f.cs").unwrap();
        assert_eq!(endpoint.http_method, HttpMethod::Put);
        assert_eq!(endpoint.route_template, "/first");
    }

    #[test]
    fn scan_reports_name_columns() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let doc = SourceDocument::new("/src/UsersController.cs", 1, USERS);
        let found = analyzer.scan_document(&doc);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line, 7);
        assert_eq!(found[0].column, 25);
    }

    fn with_gap<'a>(top: &[&'a str], blanks: usize, bottom: &[&'a str]) -> Vec<&'a str> {
        let mut lines = top.to_vec();
        lines.extend(std::iter::repeat_n("", blanks));
        lines.extend_from_slice(bottom);
        lines
    }

    #[test]
    fn verb_attribute_must_sit_within_ten_lines() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let top = ["public class UsersController", "{", "    [HttpGet]"];
        let bottom = ["    public IActionResult Get()"];

        let near = with_gap(&top, 9, &bottom);
        let endpoint = analyzer.detect(&near, near.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.http_method, HttpMethod::Get);

        let far = with_gap(&top, 10, &bottom);
        assert_eq!(analyzer.detect(&far, far.len() - 1, "f.cs"), Err(Miss::NotAnApiMethod));
    }

    #[test]
    fn controller_route_must_sit_within_ten_lines_of_the_class() {
        let analyzer = EndpointAnalyzer::new("1.0");
        let top = [r#"[Route("api/[controller]")]"#];
        let bottom = [
            "public class UsersController",
            "{",
            r#"    [HttpGet("list")]"#,
            "    public IActionResult List()",
        ];

        let near = with_gap(&top, 9, &bottom);
        let endpoint = analyzer.detect(&near, near.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/api/users/list");

        let far = with_gap(&top, 10, &bottom);
        let endpoint = analyzer.detect(&far, far.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/list");
    }

    #[test]
    fn version_attribute_must_sit_within_twenty_lines_of_the_class() {
        let top = [r#"[ApiVersion("2.0")]"#];
        let bottom = [
            r#"[Route("v{version:apiVersion}/[controller]")]"#,
            "public class UsersController",
            "{",
            "    [HttpGet]",
            "    public IActionResult Get()",
        ];

        let near = with_gap(&top, 18, &bottom);
        let endpoint = EndpointAnalyzer::new("1.0").detect(&near, near.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/v2.0/users");

        let far = with_gap(&top, 19, &bottom);
        let endpoint = EndpointAnalyzer::new("1.0").detect(&far, far.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/v1.0/users");
    }

    #[test]
    fn version_lookup_finds_the_class_within_fifty_lines() {
        let top = [
            r#"[ApiVersion("2.0")]"#,
            r#"[Route("v{version:apiVersion}/[controller]")]"#,
            "public class UsersController",
            "{",
        ];
        let bottom = ["    [HttpGet]", "    public IActionResult Get()"];

        let near = with_gap(&top, 47, &bottom);
        let endpoint = EndpointAnalyzer::new("1.0").detect(&near, near.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/v2.0/users");

        let far = with_gap(&top, 48, &bottom);
        let endpoint = EndpointAnalyzer::new("1.0").detect(&far, far.len() - 1, "f.cs").unwrap();
        assert_eq!(endpoint.route_template, "/v1.0/users");
    }
}
