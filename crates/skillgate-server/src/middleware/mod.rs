//! HTTP middleware for the gateway
//!
//! This module provides:
//! - CORS (Cross-Origin Resource Sharing)
//! - Request logging with tracing
//! - Rate limiting
//! - Correlation id extraction

use axum::http::{header, HeaderMap, HeaderName, Method};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

use crate::config::CorsConfig;

pub mod rate_limit;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Longest caller-supplied correlation id
const MAX_HEADER_ID_LENGTH: usize = 128;

/// Create CORS layer from configuration
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CORRELATION_ID_HEADER),
        ])
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static(CORRELATION_ID_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    if config.allowed_origins.is_empty() || config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);

        // Credentials cannot be combined with a wildcard origin
        if config.allow_credentials {
            cors = cors.allow_credentials(true);
        }
    }

    cors
}

/// Create tracing/logging layer
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

fn header_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_HEADER_ID_LENGTH)
        .map(str::to_string)
}

/// Correlation id from `X-Correlation-Id`, or a fresh UUIDv4
pub fn correlation_id(headers: &HeaderMap) -> String {
    header_id(headers, CORRELATION_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string())
}
