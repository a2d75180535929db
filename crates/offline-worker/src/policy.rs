//! Request interception decisions
//!
//! Everything here is pure: the functions look at configuration and the
//! request (or response) and say what should happen. The interceptor
//! carries the decisions out against storage and the network.

use crate::config::{FetchStrategy, WorkerConfig};
use crate::request::{FetchResponse, InterceptedRequest};
use axum::http::{Method, StatusCode};

/// What the worker intends to do with an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the request to the host's default network behaviour
    PassThrough,
    CacheFirst,
    NetworkFirst,
    /// Always hit the network with `no-store` and never cache the result
    NetworkOnly,
}

/// Answer served when the network has failed and nothing is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    AppShell,
    ServiceUnavailable,
}

pub fn decide(config: &WorkerConfig, request: &InterceptedRequest) -> Decision {
    if !request.is_http() || request.method != Method::GET {
        return Decision::PassThrough;
    }

    if is_bypassed(config, request) {
        return Decision::NetworkOnly;
    }

    match config.strategy {
        FetchStrategy::CacheFirst => Decision::CacheFirst,
        FetchStrategy::NetworkFirst => Decision::NetworkFirst,
    }
}

fn is_bypassed(config: &WorkerConfig, request: &InterceptedRequest) -> bool {
    let Some(host) = request.url.host_str() else {
        return false;
    };
    config
        .bypass_hosts
        .iter()
        .any(|pattern| host.contains(pattern.as_str()))
}

/// Only complete, successful responses of an accepted kind are stored
pub fn is_cacheable(config: &WorkerConfig, response: &FetchResponse) -> bool {
    response.status == StatusCode::OK && config.cacheable_kinds.contains(&response.kind)
}

pub fn offline_fallback(request: &InterceptedRequest) -> Fallback {
    if request.is_navigation() || request.accepts_html() {
        Fallback::AppShell
    } else {
        Fallback::ServiceUnavailable
    }
}
