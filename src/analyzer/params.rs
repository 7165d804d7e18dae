use crate::model::{BodyMode, HttpMethod, ParameterInfo, ParameterSource};

/// Lines joined forward from the method line while looking for the closing
/// parenthesis of the parameter list.
const PARAMETER_LOOKAHEAD: usize = 20;

const PRIMITIVE_TYPES: &[&str] = &[
    "string", "char", "bool", "byte", "sbyte", "short", "ushort", "int", "uint", "long", "ulong",
    "float", "double", "decimal", "nint", "nuint", "guid", "datetime", "datetimeoffset",
    "dateonly", "timeonly", "timespan", "int16", "uint16", "int32", "uint32", "int64", "uint64",
    "single", "boolean",
];

const MODIFIERS: &[&str] = &["this", "ref", "out", "in", "params", "scoped"];

/// Outcome of classifying one method's parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSummary {
    pub parameters: Vec<ParameterInfo>,
    pub auto_query_names: Vec<String>,
    pub preferred_body_mode: Option<BodyMode>,
}

/// Classifies the parameters of the method declared on `method_line`.
/// `route_params` are the placeholder names of the composed route.
pub fn classify(
    lines: &[&str],
    method_line: usize,
    http_method: HttpMethod,
    route_params: &[String],
) -> ParameterSummary {
    let mut summary = ParameterSummary::default();
    let Some(list) = parameter_list(lines, method_line) else {
        return summary;
    };

    for raw in split_top_level(&list) {
        let Some(param) = parse_parameter(&raw) else {
            continue;
        };
        if is_cancellation_token(&param.type_name) {
            continue;
        }
        if param.explicit == Some(ParameterSource::Form) || is_form_file(&param.type_name) {
            summary.preferred_body_mode = Some(BodyMode::Formdata);
        }

        let primitive = is_primitive(&param.type_name);
        let source = match param.explicit {
            Some(source) => {
                if source == ParameterSource::Query && primitive {
                    summary.auto_query_names.push(param.name.clone());
                }
                source
            }
            None if route_params.iter().any(|p| p.eq_ignore_ascii_case(&param.name)) => {
                ParameterSource::Route
            }
            None if is_form_file(&param.type_name) => ParameterSource::Form,
            None => {
                if primitive {
                    summary.auto_query_names.push(param.name.clone());
                }
                if http_method.binds_from_query() {
                    ParameterSource::Query
                } else {
                    ParameterSource::Body
                }
            }
        };

        let required = !param.has_default && !is_nullable(&param.type_name);
        summary.parameters.push(ParameterInfo {
            name: param.name,
            type_name: param.type_name,
            source,
            required,
        });
    }
    summary
}

struct RawParameter {
    name: String,
    type_name: String,
    explicit: Option<ParameterSource>,
    has_default: bool,
}

/// Text between the first `(` on the method line and its balancing `)`.
fn parameter_list(lines: &[&str], method_line: usize) -> Option<String> {
    let end = (method_line + PARAMETER_LOOKAHEAD).min(lines.len());
    let mut joined = String::new();
    for line in lines.get(method_line..end)? {
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(line.trim());
        if let Some(list) = balanced_parameters(&joined) {
            return Some(list);
        }
    }
    None
}

fn balanced_parameters(text: &str) -> Option<String> {
    let open = text.find('(')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut prev = '\0';
    for (offset, ch) in text[open..].char_indices() {
        if in_string {
            if ch == '"' && prev != '\\' {
                in_string = false;
            }
        } else {
            match ch {
                '"' => in_string = true,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(text[open + 1..open + offset].to_string());
                    }
                }
                _ => {}
            }
        }
        prev = ch;
    }
    None
}

/// Splits on commas that are not nested in `<>`, `()`, `[]`, `{}` or a
/// string literal.
fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut prev = '\0';
    for ch in list.chars() {
        if in_string {
            if ch == '"' && prev != '\\' {
                in_string = false;
            }
            current.push(ch);
            prev = ch;
            continue;
        }
        match ch {
            '"' => in_string = true,
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(std::mem::take(&mut current));
                prev = ch;
                continue;
            }
            _ => {}
        }
        current.push(ch);
        prev = ch;
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_parameter(raw: &str) -> Option<RawParameter> {
    let (decl, has_default) = match top_level_equals(raw) {
        Some(idx) => (raw[..idx].trim(), true),
        None => (raw.trim(), false),
    };

    let mut rest = decl;
    let mut explicit = None;
    while rest.starts_with('[') {
        let close = closing_bracket(rest)?;
        if explicit.is_none() {
            explicit = binding_attribute(&rest[1..close]);
        }
        rest = rest[close + 1..].trim_start();
    }

    let mut tokens: Vec<&str> = rest.split_whitespace().collect();
    while tokens.first().is_some_and(|t| MODIFIERS.contains(t)) {
        tokens.remove(0);
    }
    if tokens.len() < 2 {
        return None;
    }
    let name = tokens.pop()?.trim_start_matches('@').to_string();
    let type_name = tokens.join(" ");
    Some(RawParameter {
        name,
        type_name,
        explicit,
        has_default,
    })
}

fn top_level_equals(raw: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    for (idx, ch) in raw.char_indices() {
        if in_string {
            in_string = ch != '"';
            continue;
        }
        match ch {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
            '"' => in_string = true,
            '=' if depth <= 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in text.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Binding source named by an attribute list body such as
/// `FromQuery(Name = "q")` or `Required, FromBody`.
fn binding_attribute(body: &str) -> Option<ParameterSource> {
    split_top_level(body).iter().find_map(|attr| {
        let name = attr.split('(').next().unwrap_or(attr).trim();
        let name = name.rsplit('.').next().unwrap_or(name);
        let name = name.strip_suffix("Attribute").unwrap_or(name);
        match name {
            "FromQuery" => Some(ParameterSource::Query),
            "FromBody" => Some(ParameterSource::Body),
            "FromRoute" => Some(ParameterSource::Route),
            "FromHeader" => Some(ParameterSource::Header),
            "FromForm" => Some(ParameterSource::Form),
            "FromServices" | "FromKeyedServices" => Some(ParameterSource::Services),
            _ => None,
        }
    })
}

fn base_type(type_name: &str) -> &str {
    let mut t = type_name.trim();
    if let Some(inner) = t
        .strip_prefix("Nullable<")
        .or_else(|| t.strip_prefix("System.Nullable<"))
        .and_then(|s| s.strip_suffix('>'))
    {
        t = inner.trim();
    }
    let t = t.trim_end_matches('?');
    t.strip_prefix("System.").unwrap_or(t)
}

fn is_primitive(type_name: &str) -> bool {
    if type_name.contains('[') {
        return false;
    }
    let base = base_type(type_name).to_ascii_lowercase();
    PRIMITIVE_TYPES.contains(&base.as_str())
}

fn is_nullable(type_name: &str) -> bool {
    let t = type_name.trim();
    t.ends_with('?') || t.starts_with("Nullable<") || t.starts_with("System.Nullable<")
}

fn is_cancellation_token(type_name: &str) -> bool {
    base_type(type_name).rsplit('.').next() == Some("CancellationToken")
}

fn is_form_file(type_name: &str) -> bool {
    matches!(
        base_type(type_name).rsplit('.').next(),
        Some("IFormFile" | "IFormFileCollection")
    ) || type_name.contains("<IFormFile>")
}
