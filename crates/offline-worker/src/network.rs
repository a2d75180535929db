//! Live network access

use crate::config::WorkerConfig;
use crate::request::{FetchResponse, InterceptedRequest, ResponseKind};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue};
use reqwest::Client;
use std::fmt;
use tracing::debug;
use url::Url;

/// Cache directive sent along with a network fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Default,
    /// Ask every intermediary to skip its cache
    NoStore,
}

#[derive(Debug)]
pub enum NetworkError {
    Http(Box<reqwest::Error>),
    Unreachable(String),
    Timeout(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Http(err) => write!(f, "HTTP error: {}", err),
            NetworkError::Unreachable(msg) => write!(f, "Network unreachable: {}", msg),
            NetworkError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err.to_string())
        } else if err.is_connect() {
            NetworkError::Unreachable(err.to_string())
        } else {
            NetworkError::Http(Box::new(err))
        }
    }
}

/// Anything that can perform a fetch on the worker's behalf
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        cache_mode: CacheMode,
    ) -> Result<FetchResponse, NetworkError>;
}

/// HTTP client for fetching from the app origin and third-party hosts
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(config: &WorkerConfig) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.fetch_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            origin: config.origin.clone(),
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        cache_mode: CacheMode,
    ) -> Result<FetchResponse, NetworkError> {
        let mut headers = forwardable_headers(&request.headers);
        if cache_mode == CacheMode::NoStore {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }

        debug!(method = %request.method, url = %request.url, ?cache_mode, "Fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let kind = classify(&self.origin, &url, &headers);
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status = %status, size = body.len(), ?kind, "Fetched from network");

        Ok(FetchResponse {
            url: url.to_string(),
            status,
            headers,
            body,
            kind,
        })
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    // These describe the hop to the worker, not the request itself
    for name in [
        header::HOST,
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        forwarded.remove(name);
    }
    forwarded
}

/// Categorise a response the way a browser would for a page on `origin`
pub fn classify(origin: &Url, response_url: &Url, headers: &HeaderMap) -> ResponseKind {
    if origin.origin() == response_url.origin() {
        ResponseKind::Basic
    } else if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
        ResponseKind::Cors
    } else {
        ResponseKind::Opaque
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_classify_same_origin_is_basic() {
        let origin = url("http://localhost:5173");
        let kind = classify(&origin, &url("http://localhost:5173/app.js"), &HeaderMap::new());
        assert_eq!(kind, ResponseKind::Basic);
    }

    #[test]
    fn test_classify_cross_origin() {
        let origin = url("http://localhost:5173");
        let mut headers = HeaderMap::new();
        assert_eq!(
            classify(&origin, &url("https://cdn.test/lib.js"), &headers),
            ResponseKind::Opaque
        );

        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        assert_eq!(
            classify(&origin, &url("https://cdn.test/lib.js"), &headers),
            ResponseKind::Cors
        );
    }

    #[test]
    fn test_hop_headers_are_not_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3002"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let forwarded = forwardable_headers(&headers);
        assert!(!forwarded.contains_key(header::HOST));
        assert!(forwarded.contains_key(header::ACCEPT));
    }

    #[test]
    fn test_network_error_display() {
        let err = NetworkError::Timeout("30s elapsed".to_string());
        assert_eq!(format!("{}", err), "Request timed out: 30s elapsed");
    }

    async fn spawn_origin() -> Url {
        let router = Router::new()
            .route("/index.html", get(|| async { "<html>shell</html>" }))
            .route(
                "/cache-control",
                get(|headers: HeaderMap| async move {
                    headers
                        .get(header::CACHE_CONTROL)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string()
                }),
            )
            .fallback(|| async { (StatusCode::NOT_FOUND, Body::empty()) });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        url(&format!("http://{}/", addr))
    }

    #[tokio::test]
    async fn test_http_fetch_from_origin() {
        let origin = spawn_origin().await;
        let config = WorkerConfig {
            origin: origin.clone(),
            ..WorkerConfig::default()
        };
        let network = HttpNetwork::new(&config).unwrap();

        let request = InterceptedRequest::get(origin.join("index.html").unwrap());
        let response = network.fetch(&request, CacheMode::Default).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"<html>shell</html>");
        assert_eq!(response.kind, ResponseKind::Basic);
    }

    #[tokio::test]
    async fn test_no_store_sends_cache_control() {
        let origin = spawn_origin().await;
        let config = WorkerConfig {
            origin: origin.clone(),
            ..WorkerConfig::default()
        };
        let network = HttpNetwork::new(&config).unwrap();

        let request = InterceptedRequest::get(origin.join("cache-control").unwrap());
        let response = network.fetch(&request, CacheMode::NoStore).await.unwrap();
        assert_eq!(response.body, b"no-store");

        let response = network.fetch(&request, CacheMode::Default).await.unwrap();
        assert_eq!(response.body, b"none");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let config = WorkerConfig::default();
        let network = HttpNetwork::new(&config).unwrap();

        let request = InterceptedRequest::get(url("http://127.0.0.1:9/"));
        assert!(network.fetch(&request, CacheMode::Default).await.is_err());
    }
}
