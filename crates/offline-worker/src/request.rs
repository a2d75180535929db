//! Intercepted requests and the responses the worker hands back

use crate::error::{Result, WorkerError};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use partition_cache::CachedResponse;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// How the page issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

impl RequestMode {
    /// Map a `Sec-Fetch-Mode` header value
    pub fn from_fetch_mode(value: Option<&str>) -> Self {
        match value {
            Some("navigate") => Self::Navigate,
            Some("same-origin") => Self::SameOrigin,
            Some("no-cors") => Self::NoCors,
            _ => Self::Cors,
        }
    }
}

/// A request the worker has been asked to answer
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Vec<u8>,
}

impl InterceptedRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::Cors,
            body: Vec::new(),
        }
    }

    /// A top-level page load
    pub fn navigate(url: Url) -> Self {
        let mut request = Self::get(url);
        request.mode = RequestMode::Navigate;
        request
            .headers
            .insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        request
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Request identity: the URL without its fragment
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Where a response came from, relative to the requesting page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin
    Basic,
    /// Cross-origin with CORS headers
    Cors,
    /// Cross-origin without CORS headers
    Opaque,
    Error,
}

impl FromStr for ResponseKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "cors" => Ok(Self::Cors),
            "opaque" => Ok(Self::Opaque),
            "error" => Ok(Self::Error),
            other => Err(WorkerError::Config(format!("unknown response kind: {other}"))),
        }
    }
}

/// A fully buffered response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub kind: ResponseKind,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HeaderMap::new(),
            body,
            kind: ResponseKind::Basic,
        }
    }

    /// The synthetic empty answer used when neither network nor cache can help
    pub fn service_unavailable(url: impl Into<String>) -> Self {
        let mut response = Self::new(url, StatusCode::SERVICE_UNAVAILABLE, Vec::new());
        response.kind = ResponseKind::Error;
        response
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Copy into the stored representation
    pub fn to_cached(&self) -> CachedResponse {
        let mut cached = CachedResponse::new(self.url.clone(), self.status.as_u16(), self.body.clone());
        cached.headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        cached
    }

    /// Rebuild a response from storage. Headers that no longer parse are dropped.
    pub fn from_cached(cached: CachedResponse, kind: ResponseKind) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Self {
            url: cached.url,
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            headers,
            body: cached.body,
            kind,
        }
    }
}

/// How the interceptor produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    AppShell,
    Synthetic,
}

impl ResponseSource {
    /// Value for the `X-Cache` response header
    pub fn cache_header(self) -> &'static str {
        match self {
            ResponseSource::Network => "MISS",
            ResponseSource::Cache => "HIT",
            ResponseSource::AppShell => "SHELL",
            ResponseSource::Synthetic => "OFFLINE",
        }
    }
}

/// A response chosen by the interceptor
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: FetchResponse,
    pub source: ResponseSource,
}

impl Intercepted {
    pub fn new(response: FetchResponse, source: ResponseSource) -> Self {
        Self { response, source }
    }
}
