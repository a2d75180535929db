//! Fetch interception: carries out the policy's decisions

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::network::{classify, CacheMode, Network};
use crate::policy::{self, Decision, Fallback};
use crate::request::{FetchResponse, Intercepted, InterceptedRequest, ResponseKind, ResponseSource};
use partition_cache::PartitionStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub struct FetchInterceptor {
    config: Arc<WorkerConfig>,
    store: Arc<dyn PartitionStore>,
    network: Arc<dyn Network>,
}

impl FetchInterceptor {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: Arc<dyn PartitionStore>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config,
            store,
            network,
        }
    }

    /// Answer an intercepted request. `None` means the request is not ours
    /// and the host should handle it as if no worker were installed.
    pub async fn handle(&self, request: &InterceptedRequest) -> Result<Option<Intercepted>> {
        let decision = policy::decide(&self.config, request);
        debug!(method = %request.method, url = %request.url, ?decision, "Intercepted request");

        match decision {
            Decision::PassThrough => Ok(None),
            Decision::CacheFirst => Ok(Some(self.cache_first(request).await)),
            Decision::NetworkFirst => self.network_first(request).await.map(Some),
            Decision::NetworkOnly => {
                let response = self.network.fetch(request, CacheMode::NoStore).await?;
                Ok(Some(Intercepted::new(response, ResponseSource::Network)))
            }
        }
    }

    async fn cache_first(&self, request: &InterceptedRequest) -> Intercepted {
        if let Some(cached) = self.lookup(&request.cache_key()).await {
            debug!(url = %request.url, "Serving from cache");
            return Intercepted::new(cached, ResponseSource::Cache);
        }

        match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                self.store_copy(request, &response).await;
                Intercepted::new(response, ResponseSource::Network)
            }
            Err(e) => {
                info!(url = %request.url, error = %e, "Network failed, falling back");
                self.offline_response(request).await
            }
        }
    }

    async fn network_first(&self, request: &InterceptedRequest) -> Result<Intercepted> {
        let err = match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                self.store_copy(request, &response).await;
                return Ok(Intercepted::new(response, ResponseSource::Network));
            }
            Err(e) => e,
        };

        info!(url = %request.url, error = %err, "Network failed, trying cache");

        if let Some(cached) = self.lookup(&request.cache_key()).await {
            return Ok(Intercepted::new(cached, ResponseSource::Cache));
        }

        if request.is_navigation() {
            if let Some(shell) = self.app_shell().await {
                return Ok(Intercepted::new(shell, ResponseSource::AppShell));
            }
        }

        Err(err.into())
    }

    async fn offline_response(&self, request: &InterceptedRequest) -> Intercepted {
        if policy::offline_fallback(request) == Fallback::AppShell {
            if let Some(shell) = self.app_shell().await {
                return Intercepted::new(shell, ResponseSource::AppShell);
            }
        }

        Intercepted::new(
            FetchResponse::service_unavailable(request.url.as_str()),
            ResponseSource::Synthetic,
        )
    }

    /// The cached app-shell document, from whichever partition holds it
    pub async fn app_shell(&self) -> Option<FetchResponse> {
        match self.config.app_shell_url() {
            Ok(url) => self.lookup(&url.to_string()).await,
            Err(e) => {
                warn!(error = %e, "App shell path does not resolve");
                None
            }
        }
    }

    /// Cache lookups never fail a request; a storage error reads as a miss
    async fn lookup(&self, key: &str) -> Option<FetchResponse> {
        match self.store.match_any(key).await {
            Ok(Some(cached)) => {
                let mut response = FetchResponse::from_cached(cached, ResponseKind::Basic);
                if let Ok(url) = Url::parse(&response.url) {
                    response.kind = classify(&self.config.origin, &url, &response.headers);
                }
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Best-effort write of a copy into the dynamic partition
    async fn store_copy(&self, request: &InterceptedRequest, response: &FetchResponse) {
        if !policy::is_cacheable(&self.config, response) {
            debug!(url = %request.url, status = %response.status, kind = ?response.kind, "Not caching response");
            return;
        }

        let partition = self.config.dynamic_partition();
        if let Err(e) = self
            .store
            .put(&partition, &request.cache_key(), response.to_cached())
            .await
        {
            warn!(url = %request.url, partition = %partition, error = %e, "Failed to cache response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchStrategy;
    use crate::testing::FakeNetwork;
    use axum::http::{Method, StatusCode};
    use partition_cache::{CachedResponse, MemoryStore};

    const SHELL: &str = "http://localhost:5173/index.html";

    struct Harness {
        interceptor: FetchInterceptor,
        store: Arc<MemoryStore>,
        network: Arc<FakeNetwork>,
        config: Arc<WorkerConfig>,
    }

    fn harness(config: WorkerConfig) -> Harness {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let network = Arc::new(FakeNetwork::new());
        let interceptor = FetchInterceptor::new(config.clone(), store.clone(), network.clone());
        Harness {
            interceptor,
            store,
            network,
            config,
        }
    }

    fn get(url: &str) -> InterceptedRequest {
        InterceptedRequest::get(Url::parse(url).unwrap())
    }

    fn navigate(url: &str) -> InterceptedRequest {
        InterceptedRequest::navigate(Url::parse(url).unwrap())
    }

    async fn precache_shell(h: &Harness) {
        h.store
            .put(
                &h.config.static_partition(),
                SHELL,
                CachedResponse::new(SHELL, 200, b"<html>shell</html>".to_vec()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cached_request_skips_network() {
        let h = harness(WorkerConfig::default());
        h.store
            .put(
                "any-partition",
                "http://localhost:5173/app.js",
                CachedResponse::new("http://localhost:5173/app.js", 200, b"cached".to_vec()),
            )
            .await
            .unwrap();

        let result = h
            .interceptor
            .handle(&get("http://localhost:5173/app.js"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.source, ResponseSource::Cache);
        assert_eq!(result.response.body, b"cached");
        assert_eq!(h.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_fetch_is_cached_for_next_request() {
        let h = harness(WorkerConfig::default());
        h.network.serve("http://localhost:5173/index.html", "<html>v1</html>");

        let first = h.interceptor.handle(&get(SHELL)).await.unwrap().unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(h.network.calls(), 1);

        h.network.set_offline(true);
        let second = h.interceptor.handle(&get(SHELL)).await.unwrap().unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.body, b"<html>v1</html>");
        assert_eq!(h.network.calls(), 1);

        let keys = h.store.keys(&h.config.dynamic_partition()).await.unwrap();
        assert_eq!(keys, vec![SHELL.to_string()]);
    }

    #[tokio::test]
    async fn test_unsuccessful_responses_are_not_cached() {
        let h = harness(WorkerConfig::default());
        let url = "http://localhost:5173/missing.png";

        let result = h.interceptor.handle(&get(url)).await.unwrap().unwrap();
        assert_eq!(result.response.status, StatusCode::NOT_FOUND);
        assert!(h.store.match_any(url).await.unwrap().is_none());

        let opaque = "https://cdn.test/font.woff2";
        h.network.serve_response(
            opaque,
            FetchResponse::new(opaque, StatusCode::OK, b"font".to_vec()).with_kind(ResponseKind::Opaque),
        );
        h.interceptor.handle(&get(opaque)).await.unwrap();
        assert!(h.store.match_any(opaque).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_get_has_no_cache_side_effect() {
        let h = harness(WorkerConfig::default());
        let mut request = get("http://localhost:5173/api/notes");
        request.method = Method::POST;

        assert!(h.interceptor.handle(&request).await.unwrap().is_none());
        assert_eq!(h.network.calls(), 0);
        assert!(h.store.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_app_shell() {
        let h = harness(WorkerConfig::default());
        precache_shell(&h).await;
        h.network.set_offline(true);

        let result = h
            .interceptor
            .handle(&navigate("http://localhost:5173/notes/42"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.source, ResponseSource::AppShell);
        assert_eq!(result.response.body, b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_shell_is_503() {
        let h = harness(WorkerConfig::default());
        h.network.set_offline(true);

        let result = h
            .interceptor
            .handle(&navigate("http://localhost:5173/notes/42"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.source, ResponseSource::Synthetic);
        assert_eq!(result.response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_offline_asset_is_503_even_with_shell() {
        let h = harness(WorkerConfig::default());
        precache_shell(&h).await;
        h.network.set_offline(true);

        let result = h
            .interceptor
            .handle(&get("http://localhost:5173/data.json"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(result.response.body.is_empty());
    }

    #[tokio::test]
    async fn test_network_first_prefers_fresh_response() {
        let h = harness(WorkerConfig {
            strategy: FetchStrategy::NetworkFirst,
            ..WorkerConfig::default()
        });
        let url = "http://localhost:5173/feed.json";
        h.store
            .put("old", url, CachedResponse::new(url, 200, b"stale".to_vec()))
            .await
            .unwrap();
        h.network.serve(url, "fresh");

        let result = h.interceptor.handle(&get(url)).await.unwrap().unwrap();
        assert_eq!(result.source, ResponseSource::Network);
        assert_eq!(result.response.body, b"fresh");

        let stored = h
            .store
            .get(&h.config.dynamic_partition(), url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"fresh");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache_then_shell() {
        let h = harness(WorkerConfig {
            strategy: FetchStrategy::NetworkFirst,
            ..WorkerConfig::default()
        });
        let url = "http://localhost:5173/feed.json";
        h.network.serve(url, "fresh");
        h.interceptor.handle(&get(url)).await.unwrap();
        precache_shell(&h).await;
        h.network.set_offline(true);

        let cached = h.interceptor.handle(&get(url)).await.unwrap().unwrap();
        assert_eq!(cached.source, ResponseSource::Cache);
        assert_eq!(cached.response.body, b"fresh");

        let shell = h
            .interceptor
            .handle(&navigate("http://localhost:5173/settings"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.source, ResponseSource::AppShell);

        let err = h
            .interceptor
            .handle(&get("http://localhost:5173/other.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::WorkerError::Network(_)));
    }

    #[tokio::test]
    async fn test_bypass_host_is_never_cached() {
        let h = harness(WorkerConfig {
            bypass_hosts: vec!["supabase.co".to_string()],
            ..WorkerConfig::default()
        });
        let url = "https://project.supabase.co/rest/v1/notes";
        h.network.serve_response(
            url,
            FetchResponse::new(url, StatusCode::OK, b"[]".to_vec()).with_kind(ResponseKind::Cors),
        );

        let result = h.interceptor.handle(&get(url)).await.unwrap().unwrap();
        assert_eq!(result.source, ResponseSource::Network);
        assert!(h.store.match_any(url).await.unwrap().is_none());
        assert_eq!(h.network.requests(), vec![(url.to_string(), CacheMode::NoStore)]);

        h.network.set_offline(true);
        assert!(h.interceptor.handle(&get(url)).await.is_err());
    }

    #[tokio::test]
    async fn test_cached_kind_is_restored() {
        let h = harness(WorkerConfig::default());
        let url = "https://cdn.test/lib.js";
        h.network.serve_response(
            url,
            FetchResponse::new(url, StatusCode::OK, b"lib".to_vec())
                .with_kind(ResponseKind::Cors)
                .with_header(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        );

        h.interceptor.handle(&get(url)).await.unwrap();
        let cached = h.interceptor.handle(&get(url)).await.unwrap().unwrap();
        assert_eq!(cached.source, ResponseSource::Cache);
        assert_eq!(cached.response.kind, ResponseKind::Cors);
    }
}
