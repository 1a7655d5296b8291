//! Shared fixtures for gateway integration tests
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use skillgate_common::types::{EntityId, NodeId};
use skillgate_server::{
    allowlist::AllowlistRegistry,
    auth::WindowGranularity,
    clock::{Clock, ManualClock},
    config::Config,
    gateway::{create_router, AppState, Gateway},
    store::memory::MemoryBackend,
};

pub const SECRET: &str = "integration-secret-prefix-";

pub const ALLOWLIST: &str = r#"
    [tables.assignments]
    columns = ["entity_id", "node_id", "proficiency_level", "version", "updated_at"]

    [tables.hierarchy_nodes]
    columns = ["id", "parent_id", "level", "disabled"]

    [tables.entity_skill_matrix]
    procedure = { name = "sg_entity_skill_matrix", params = ["entity_id"] }
"#;

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<Gateway>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 10).unwrap()
}

pub fn node(raw: &str) -> NodeId {
    NodeId::parse(raw).unwrap()
}

pub fn entity(raw: &str) -> EntityId {
    EntityId::parse(raw).unwrap()
}

/// Config with hour windows and a small rate limit
pub fn config(requests_per_window: u32) -> Config {
    let mut config = Config::default();
    config.auth.shared_secret = SECRET.to_string();
    config.auth.granularity = WindowGranularity::Hour;
    config.rate_limit.requests_per_window = requests_per_window;
    config.rate_limit.window_secs = 60;
    config.query.row_ceiling = 50;
    config.query.full_width_row_limit = 20;
    config
}

/// Memory-backed app: root -> {N1, N2, N3}, entities E1 and E2
pub fn app_with(config: Config) -> TestApp {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_node(node("root"), None).unwrap();
    for id in ["N1", "N2", "N3"] {
        backend.insert_node(node(id), Some(node("root"))).unwrap();
    }
    backend.insert_entity(entity("E1"), vec![node("root")]);
    backend.insert_entity(entity("E2"), vec![node("root")]);

    let clock = Arc::new(ManualClock::new(start()));
    let registry = Arc::new(AllowlistRegistry::from_toml_str(ALLOWLIST).unwrap());
    let gateway = Arc::new(Gateway::new(&config, registry, backend.clone(), clock.clone()));
    let router = create_router(
        AppState {
            gateway: gateway.clone(),
        },
        &config.cors,
    );

    TestApp {
        router,
        backend,
        clock,
        gateway,
    }
}

pub fn app() -> TestApp {
    app_with(config(100))
}

impl TestApp {
    pub fn credential(&self) -> String {
        format!("{SECRET}{}", WindowGranularity::Hour.label(self.clock.now()))
    }

    pub async fn post(&self, uri: &str, body: Value) -> (Response<Body>, Value) {
        self.post_as(uri, body, Some(&self.credential()), None).await
    }

    pub async fn post_as(
        &self,
        uri: &str,
        body: Value,
        credential: Option<&str>,
        client_id: Option<&str>,
    ) -> (Response<Body>, Value) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(credential) = credential {
            request = request.header(header::AUTHORIZATION, format!("Bearer {credential}"));
        }
        if let Some(client_id) = client_id {
            request = request.header("x-client-id", client_id);
        }
        let request = request.body(Body::from(body.to_string())).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (Response::from_parts(parts, Body::empty()), json)
    }
}
