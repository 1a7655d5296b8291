//! HTTP routes
//!
//! # Route Structure
//!
//! - `GET /health` - Liveness and backend reachability
//! - `POST /api/v1/gateway` - `read` or `sync` envelope
//! - `POST /api/v1/gateway/batch` - Multi-entity synchronization
//! - `POST /api/v1/hierarchy/nodes` - Create a hierarchy node
//! - `POST /api/v1/hierarchy/nodes/:id/disable` - Soft-disable a node
//!
//! Every response echoes `X-Correlation-Id`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::error::GatewayError;
use crate::middleware::{self, CORRELATION_ID_HEADER};

use super::{Gateway, GatewayResponse, RequestContext};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api = Router::new()
        .route("/gateway", post(gateway))
        .route("/gateway/batch", post(gateway_batch))
        .route("/hierarchy/nodes", post(create_node))
        .route("/hierarchy/nodes/:id/disable", post(disable_node));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

fn respond(ctx: &RequestContext, result: Result<GatewayResponse, GatewayError>) -> Response {
    let mut response = result.into_response();
    if let Ok(value) = HeaderValue::from_str(&ctx.correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    response
}

#[tracing::instrument(skip_all)]
async fn gateway(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = state.gateway.context(&headers);
    let result = state.gateway.handle(&ctx, &body).await;
    respond(&ctx, result)
}

#[tracing::instrument(skip_all)]
async fn gateway_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = state.gateway.context(&headers);
    let result = state.gateway.handle_batch(&ctx, &body).await;
    respond(&ctx, result)
}

#[tracing::instrument(skip_all)]
async fn create_node(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = state.gateway.context(&headers);
    let result = state.gateway.create_node(&ctx, &body).await;
    respond(&ctx, result)
}

#[tracing::instrument(skip(state, headers))]
async fn disable_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = state.gateway.context(&headers);
    let result = state.gateway.disable_node(&ctx, &id).await;
    respond(&ctx, result)
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Response {
    match state.gateway.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "backend": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Backend health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "backend": "unreachable"
                })),
            )
                .into_response()
        },
    }
}
