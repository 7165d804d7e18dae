//! Outbound HTTP for the request panel.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::model::BodyMode;

const DEFAULT_FILE_NAME: &str = "upload.bin";
const OCTET_STREAM: &str = "application/octet-stream";
const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldKind {
    #[default]
    Text,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDataField {
    pub key: String,
    #[serde(rename = "type", default)]
    pub kind: FormFieldKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_base64: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_mode: BodyMode,
    #[serde(default)]
    pub binary_body_base64: Option<String>,
    #[serde(default)]
    pub binary_content_type: Option<String>,
    #[serde(default)]
    pub binary_file_name: Option<String>,
    #[serde(default)]
    pub form_data_fields: Vec<FormDataField>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds.
    pub duration: u64,
}

impl HttpResponse {
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration: duration.as_millis() as u64,
            ..Self::default()
        }
    }
}

/// Sends one request. Never fails: transport errors come back as an
/// unsuccessful [`HttpResponse`]. Any HTTP status counts as success.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> HttpResponse;
}

/// Request body after decoding, before it is attached to a builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Text(String),
    Bytes { data: Vec<u8>, content_type: String },
    Multipart(Vec<MultipartField>),
    /// Binary body without an explicit content type: sent as multipart
    /// field `file`, then as raw bytes if the server answers 415.
    FileThenRaw {
        data: Vec<u8>,
        file_name: String,
        content_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartField {
    Text { key: String, value: String },
    File {
        key: String,
        data: Vec<u8>,
        file_name: String,
        content_type: String,
    },
}

pub fn prepare_payload(request: &HttpRequest) -> Result<Payload> {
    let has_content_type = request
        .headers
        .keys()
        .any(|key| key.eq_ignore_ascii_case("content-type"));
    match request.body_mode {
        BodyMode::Binary => {
            let Some(encoded) = request.binary_body_base64.as_deref().filter(|b| !b.is_empty()) else {
                return Ok(text_payload(request));
            };
            let data = BASE64.decode(encoded).context("decode binary body")?;
            let content_type = request
                .binary_content_type
                .clone()
                .filter(|ct| !ct.is_empty())
                .unwrap_or_else(|| OCTET_STREAM.to_string());
            if has_content_type {
                Ok(Payload::Bytes { data, content_type })
            } else {
                let file_name = request
                    .binary_file_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
                Ok(Payload::FileThenRaw {
                    data,
                    file_name,
                    content_type,
                })
            }
        }
        BodyMode::Formdata if !request.form_data_fields.is_empty() => {
            let mut fields = Vec::with_capacity(request.form_data_fields.len());
            for field in &request.form_data_fields {
                match field.kind {
                    FormFieldKind::Text => fields.push(MultipartField::Text {
                        key: field.key.clone(),
                        value: field.value.clone().unwrap_or_default(),
                    }),
                    FormFieldKind::File => {
                        let Some(encoded) = field.value_base64.as_deref().filter(|b| !b.is_empty()) else {
                            continue;
                        };
                        let data = BASE64
                            .decode(encoded)
                            .with_context(|| format!("decode form file {}", field.key))?;
                        fields.push(MultipartField::File {
                            key: field.key.clone(),
                            data,
                            file_name: field
                                .file_name
                                .clone()
                                .filter(|n| !n.is_empty())
                                .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
                            content_type: field
                                .content_type
                                .clone()
                                .filter(|ct| !ct.is_empty())
                                .unwrap_or_else(|| OCTET_STREAM.to_string()),
                        });
                    }
                }
            }
            Ok(Payload::Multipart(fields))
        }
        _ => Ok(text_payload(request)),
    }
}

fn text_payload(request: &HttpRequest) -> Payload {
    match request.body.as_deref() {
        Some(body) if !body.is_empty() => Payload::Text(body.to_string()),
        _ => Payload::None,
    }
}

pub struct ReqwestTransport {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("create HTTP client")?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    fn execute(&self, request: &HttpRequest, timeout: Duration) -> Result<(StatusCode, HeaderMap, String)> {
        let method = Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow!("invalid HTTP method {:?}", request.method))?;
        let has_content_type = request
            .headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case("content-type"));
        let base = || {
            let mut builder = self.client.request(method.clone(), &request.url).timeout(timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder
        };

        let response = match prepare_payload(request)? {
            Payload::None => base().send()?,
            Payload::Text(body) => with_default_type(base(), has_content_type, JSON).body(body).send()?,
            Payload::Bytes { data, content_type } => {
                with_default_type(base(), has_content_type, &content_type).body(data).send()?
            }
            Payload::Multipart(fields) => base().multipart(build_form(fields)?).send()?,
            Payload::FileThenRaw {
                data,
                file_name,
                content_type,
            } => {
                let part = multipart::Part::bytes(data.clone())
                    .file_name(file_name)
                    .mime_str(&content_type)?;
                let first = base().multipart(multipart::Form::new().part("file", part)).send()?;
                if first.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
                    debug!(url = %request.url, "multipart upload rejected with 415, retrying raw body");
                    base().header(CONTENT_TYPE, content_type).body(data).send()?
                } else {
                    first
                }
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text()?;
        Ok((status, headers, body))
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> HttpResponse {
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        match self.execute(request, timeout) {
            Ok((status, headers, body)) => HttpResponse {
                success: true,
                status_code: Some(status.as_u16()),
                headers: Some(flatten_headers(&headers)),
                body: Some(body),
                error: None,
                duration: started.elapsed().as_millis() as u64,
            },
            Err(err) => {
                let message = describe_error(&err, timeout);
                warn!(method = %request.method, url = %request.url, "request failed: {message}");
                HttpResponse::failure(message, started.elapsed())
            }
        }
    }
}

fn with_default_type(builder: RequestBuilder, has_content_type: bool, content_type: &str) -> RequestBuilder {
    if has_content_type {
        builder
    } else {
        builder.header(CONTENT_TYPE, content_type)
    }
}

fn build_form(fields: Vec<MultipartField>) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { key, value } => form.text(key, value),
            MultipartField::File {
                key,
                data,
                file_name,
                content_type,
            } => {
                let part = multipart::Part::bytes(data)
                    .file_name(file_name)
                    .mime_str(&content_type)?;
                form.part(key, part)
            }
        };
    }
    Ok(form)
}

/// Repeated header names are joined with `, `.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flat
}

fn describe_error(err: &anyhow::Error, timeout: Duration) -> String {
    let timed_out = err
        .downcast_ref::<reqwest::Error>()
        .is_some_and(reqwest::Error::is_timeout);
    if timed_out {
        format!("Request timeout ({}s)", timeout.as_secs())
    } else {
        format!("{err:#}")
    }
}
