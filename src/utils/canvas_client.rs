use bytes::{Bytes, BytesMut};
use reqwest::{header, Client, Method, Response};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CanvasConfig, DownloadFallback};

/// Page cap applied when a paginated request does not name one.
pub const DEFAULT_MAX_PAGES: u32 = 5;

pub const USER_AGENT: &str = concat!("mcp-canvas/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to parse PDF: {0}")]
    ContentFormat(String),

    #[error("Download from {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: usize },
}

impl CanvasError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// A single logical API call: one request, or one request plus follow-up pages.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub params: Map<String, Value>,
    pub paginate: bool,
    pub max_pages: Option<u32>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            params: Map::new(),
            paginate: false,
            max_pages: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Merges the entries of a JSON object into the query parameters.
    /// `null` entries are kept here and dropped at encoding time.
    pub fn params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.params.extend(map);
        }
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn paginate(mut self, max_pages: Option<u32>) -> Self {
        self.paginate = true;
        self.max_pages = max_pages;
        self
    }
}

/// Flattens parameters into query pairs using Canvas conventions:
/// arrays become repeated `key[]` pairs, nulls are dropped, strings are sent unquoted.
pub fn encode_query_params(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut encoded = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => continue,
            Value::Array(items) => {
                let name = format!("{}[]", key);
                encoded.extend(
                    items
                        .iter()
                        .filter(|item| !item.is_null())
                        .map(|item| (name.clone(), scalar_to_string(item))),
                );
            }
            scalar => encoded.push((key.clone(), scalar_to_string(scalar))),
        }
    }
    encoded
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Returns the `rel="next"` target of an RFC 8288 `Link` header.
/// Entries without at least one attribute segment are skipped.
pub fn parse_next_link(link_header: Option<&str>) -> Option<String> {
    let header = link_header?;

    for entry in header.split(',') {
        let segments: Vec<&str> = entry.split(';').map(str::trim).collect();
        if segments.len() < 2 {
            continue;
        }
        if !segments[1..].iter().any(|s| s.contains(r#"rel="next""#)) {
            continue;
        }

        let target = segments[0];
        let target = target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(target);
        if !target.is_empty() {
            return Some(target.to_string());
        }
    }

    None
}

fn is_absolute_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Which credentials a download attempt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadAuth {
    Bearer,
    Anonymous,
}

impl DownloadAuth {
    /// The attempt to make after `self` failed with `err`, or `None` when the failure is terminal.
    fn next(self, err: &CanvasError, policy: DownloadFallback) -> Option<Self> {
        if matches!(err, CanvasError::TooLarge { .. }) {
            return None;
        }
        match self {
            Self::Bearer if err.is_auth_rejection() || policy == DownloadFallback::AnyError => {
                Some(Self::Anonymous)
            }
            _ => None,
        }
    }
}

struct Page {
    body: Value,
    next_link: Option<String>,
}

pub struct CanvasClient {
    http: Client,
    base_url: String,
    token: String,
    download_fallback: DownloadFallback,
    max_download_bytes: usize,
}

impl CanvasClient {
    pub fn new(config: &CanvasConfig) -> Result<Self, CanvasError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            download_fallback: config.download_fallback,
            max_download_bytes: config.max_download_bytes,
        })
    }

    /// Absolute http(s) URLs are used verbatim (pagination links are always absolute);
    /// anything else is treated as a path under the base URL.
    pub fn resolve_url(&self, path_or_url: &str) -> String {
        if is_absolute_url(path_or_url) {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{}", self.base_url, path_or_url)
        } else {
            format!("{}/{}", self.base_url, path_or_url)
        }
    }

    /// Issues the request and, when asked to and the body is a list, follows `Link: rel="next"`
    /// until the links run out or the page cap is hit. Any failing page fails the whole call.
    pub async fn request(&self, request: ApiRequest) -> Result<Value, CanvasError> {
        let url = self.resolve_url(&request.path);
        let query = encode_query_params(&request.params);
        let first = self.send_json(request.method.clone(), &url, &query).await?;

        let mut results = match first.body {
            Value::Array(items) if request.paginate => items,
            body => return Ok(body),
        };

        let max_pages = request.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        let mut page_count: u32 = 1;
        let mut next_link = first.next_link;

        while let Some(next_url) = next_link {
            if page_count >= max_pages {
                debug!(url = %url, max_pages = max_pages, "Page cap reached; not following next link");
                break;
            }

            debug!(next = %next_url, page = page_count + 1, "Following next page link");
            let page = self.send_json(Method::GET, &next_url, &[]).await?;
            match page.body {
                Value::Array(items) => results.extend(items),
                _ => {
                    warn!(next = %next_url, "Next page did not return a list; stopping pagination");
                    break;
                }
            }

            next_link = page.next_link;
            page_count += 1;
        }

        info!(
            url = %url,
            pages = page_count,
            items = results.len(),
            "Paginated request finished"
        );
        Ok(Value::Array(results))
    }

    /// Downloads raw bytes. The first attempt carries the bearer token; a 401/403 (or, under
    /// `DownloadFallback::AnyError`, any failure) triggers one anonymous retry for signed storage URLs.
    /// Bodies above the configured byte cap are rejected without a retry.
    pub async fn fetch_binary(&self, url: &str) -> Result<Bytes, CanvasError> {
        let url = self.resolve_url(url);
        let mut auth = DownloadAuth::Bearer;

        loop {
            match self.download(&url, auth).await {
                Ok(bytes) => {
                    info!(url = %url, size = bytes.len(), auth = ?auth, "Binary download completed");
                    return Ok(bytes);
                }
                Err(err) => match auth.next(&err, self.download_fallback) {
                    Some(next) => {
                        warn!(url = %url, error = %err, "Authenticated download failed; retrying without credentials");
                        auth = next;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    async fn download(&self, url: &str, auth: DownloadAuth) -> Result<Bytes, CanvasError> {
        debug!(url = %url, auth = ?auth, "Starting binary download");

        let mut builder = self.http.get(url);
        if auth == DownloadAuth::Bearer {
            builder = builder
                .bearer_auth(&self.token)
                .header(header::ACCEPT, "application/json");
        }

        let mut response = ensure_success(builder.send().await?).await?;
        let limit = self.max_download_bytes;
        let too_large = || CanvasError::TooLarge {
            url: url.to_string(),
            limit,
        };

        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(too_large());
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    async fn send_json(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Page, CanvasError> {
        debug!(method = %method, url = %url, params = query.len(), "Canvas API request");

        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }

        let response = ensure_success(builder.send().await?).await?;
        let next_link = parse_next_link(
            response
                .headers()
                .get(header::LINK)
                .and_then(|v| v.to_str().ok()),
        );

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok(Page { body, next_link })
    }
}

async fn ensure_success(response: Response) -> Result<Response, CanvasError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!(url = %url, status = status.as_u16(), "Canvas returned non-success status");
    Err(CanvasError::HttpStatus {
        status: status.as_u16(),
        url,
        body,
    })
}
