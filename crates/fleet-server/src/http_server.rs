//! HTTP server for the machine API and Prometheus metrics endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use fleet::{EngineMetrics, Machine, MachineRegistry, MachineStore};
use prometheus_client::encoding::text::encode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MachineRegistry>,
    pub metrics: Arc<EngineMetrics>,
    /// Expected bearer token; `None` disables authentication
    pub bearer_token: Option<String>,
    pub readonly: bool,
}

/// Response of `GET /status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub auth: bool,
    pub readonly: bool,
    pub machines: usize,
}

/// HTTP server for the machine API
pub struct ApiServer {
    state: AppState,
    /// Listen address
    listen_addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let app = router(self.state);

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Build the full router
pub fn router(state: AppState) -> Router {
    let machines = Router::new()
        .route("/machines/", get(list_machines).put(upsert_machine).post(upsert_machine))
        .route("/machines/:field/:value", get(filter_machines))
        .route("/machines/:hostname", delete(delete_machine))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .merge(machines)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Authentication and readonly enforcement for the machine routes
async fn guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref token) = state.bearer_token {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .map(|auth| auth.to_str().unwrap_or_default())
            .unwrap_or_default();
        if provided.is_empty() {
            return (StatusCode::FORBIDDEN, "No Authorization provided").into_response();
        }

        if provided.strip_prefix("Bearer ").unwrap_or(provided) != token {
            return (StatusCode::FORBIDDEN, "Authorization failed").into_response();
        }
    }

    let method = request.method();
    if state.readonly && (method == Method::PUT || method == Method::POST || method == Method::DELETE) {
        return (StatusCode::METHOD_NOT_ALLOWED, "Readonly mode").into_response();
    }

    next.run(request).await
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        auth: state.bearer_token.is_some(),
        readonly: state.readonly,
        machines: state.registry.len().await,
    })
}

async fn list_machines(State(state): State<AppState>) -> Json<Vec<Machine>> {
    let mut machines = state.registry.snapshot().await;
    machines.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    Json(machines)
}

async fn filter_machines(
    State(state): State<AppState>,
    Path((field, value)): Path<(String, String)>,
) -> Json<Vec<Machine>> {
    let mut machines = state.registry.filter(&field, &value).await;
    machines.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    Json(machines)
}

async fn delete_machine(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> impl IntoResponse {
    if state.registry.remove(&hostname).await {
        info!(hostname = %hostname, "Machine removed");
        (StatusCode::OK, "Removed")
    } else {
        (StatusCode::NO_CONTENT, "Nothing removed")
    }
}

async fn upsert_machine(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let machine: Machine = match serde_json::from_slice(&body) {
        Ok(machine) => machine,
        Err(e) => {
            warn!(error = %e, "Failed to parse request body");
            return (StatusCode::BAD_REQUEST, "Failed to parse request body");
        }
    };
    if machine.hostname.is_empty() {
        return (StatusCode::BAD_REQUEST, "Machine hostname is required");
    }

    info!(hostname = %machine.hostname, "Machine updated");
    state.registry.upsert(machine).await;
    (StatusCode::OK, "Done")
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    // Encode metrics to Prometheus text format
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}
