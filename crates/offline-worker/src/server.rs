//! HTTP edge: runs the worker as a local offline-first proxy
//!
//! `/__worker/*` routes deliver the auxiliary events; every other request
//! is intercepted as a fetch against the configured app origin.

use crate::error::WorkerError;
use crate::events::{EventOutcome, WorkerEvent};
use crate::lifecycle::WorkerState;
use crate::network::CacheMode;
use crate::request::{FetchResponse, InterceptedRequest, RequestMode, ResponseSource};
use crate::worker::ServiceWorker;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use partition_cache::CacheStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

pub type SharedState = Arc<ServiceWorker>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub state: WorkerState,
    pub partitions: Vec<String>,
    pub cache: CacheStats,
}

#[derive(Debug, Deserialize)]
struct ClickRequest {
    action: Option<String>,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/__worker/health", get(health))
        .route("/__worker/message", post(message))
        .route("/__worker/sync/{tag}", post(sync))
        .route("/__worker/periodic-sync/{tag}", post(periodic_sync))
        .route("/__worker/push", post(push))
        .route("/__worker/notification-click", post(notification_click))
        .fallback(intercept)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, WorkerError> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        state: state.state().await,
        partitions: state.store().partitions().await?,
        cache: state.store().stats().await,
    }))
}

async fn message(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Response, WorkerError> {
    let outcome = state.handle(WorkerEvent::Message(body)).await?;
    Ok(outcome_response(outcome))
}

async fn sync(
    State(state): State<SharedState>,
    Path(tag): Path<String>,
) -> Result<Response, WorkerError> {
    let outcome = state.handle(WorkerEvent::Sync { tag }).await?;
    Ok(outcome_response(outcome))
}

async fn periodic_sync(
    State(state): State<SharedState>,
    Path(tag): Path<String>,
) -> Result<Response, WorkerError> {
    let outcome = state.handle(WorkerEvent::PeriodicSync { tag }).await?;
    Ok(outcome_response(outcome))
}

async fn push(State(state): State<SharedState>, body: Bytes) -> Result<Response, WorkerError> {
    let data = (!body.is_empty()).then(|| body.to_vec());
    let outcome = state.handle(WorkerEvent::Push { data }).await?;
    Ok(outcome_response(outcome))
}

async fn notification_click(
    State(state): State<SharedState>,
    Json(click): Json<ClickRequest>,
) -> Result<Response, WorkerError> {
    let outcome = state
        .handle(WorkerEvent::NotificationClick {
            action: click.action,
        })
        .await?;
    Ok(outcome_response(outcome))
}

/// Every request that is not a worker route is a fetch from the page
async fn intercept(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WorkerError> {
    // Only the path and query are taken from the request target; the host
    // is always the configured origin
    let mut url = state.config().origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    let mode = RequestMode::from_fetch_mode(
        headers
            .get("sec-fetch-mode")
            .and_then(|v| v.to_str().ok()),
    );

    let request = InterceptedRequest {
        method,
        url,
        headers,
        mode,
        body: body.to_vec(),
    };

    match state.handle(WorkerEvent::Fetch(request.clone())).await? {
        EventOutcome::Responded(Some(intercepted)) => {
            Ok(proxy_response(intercepted.response, Some(intercepted.source)))
        }
        EventOutcome::Responded(None) => {
            debug!(method = %request.method, url = %request.url, "Passing through");
            let response = state.network().fetch(&request, CacheMode::Default).await?;
            Ok(proxy_response(response, None))
        }
        other => Ok(outcome_response(other)),
    }
}

fn proxy_response(response: FetchResponse, source: Option<ResponseSource>) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;

    // The body is buffered, so framing headers from upstream no longer apply
    let headers = out.headers_mut();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);

    if let Some(source) = source {
        headers.insert("x-cache", HeaderValue::from_static(source.cache_header()));
    }
    out
}

fn outcome_response(outcome: EventOutcome) -> Response {
    match outcome {
        EventOutcome::Installed(report) => Json(report).into_response(),
        EventOutcome::Activated(report) => Json(report).into_response(),
        EventOutcome::Synced(report) => Json(report).into_response(),
        EventOutcome::NotificationShown(notification) => Json(notification).into_response(),
        EventOutcome::NotificationClicked(click) => Json(click).into_response(),
        EventOutcome::Message(outcome) => Json(outcome).into_response(),
        EventOutcome::Responded(Some(intercepted)) => {
            proxy_response(intercepted.response, Some(intercepted.source))
        }
        EventOutcome::Responded(None) => StatusCode::NO_CONTENT.into_response(),
    }
}
