//! Access gateway
//!
//! Composes the pipeline every call runs through:
//!
//! ```text
//! rate limit -> authenticate -> parse envelope -> allowlist -> router | sync engine
//! ```
//!
//! Each stage may short-circuit with a typed [`GatewayError`]. The allowlist is
//! consulted by the query router, and audit records are written by the store
//! inside the mutation transaction, so neither appears as a separate step here.

pub mod envelope;
pub mod routes;

use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::allowlist::AllowlistRegistry;
use crate::auth::{bearer_credential, Authenticated, TokenAuthenticator};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::GatewayError;
use crate::middleware::rate_limit::RateLimiter;
use crate::middleware::correlation_id;
use crate::query::QueryRouter;
use crate::store::{AssignmentStore, ReadBackend};
use crate::sync::SyncEngine;

use skillgate_common::types::NodeId;

pub use envelope::{
    BatchEnvelope, GatewayRequest, GatewayResponse, NodeEnvelope, SyncEnvelope,
};
pub use routes::{create_router, AppState};

/// Per-call inputs taken from the transport
///
/// The rate-limit key is the caller class, never a caller-supplied header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub caller_key: String,
    pub credential: Option<String>,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, caller_class: &str) -> Self {
        Self {
            caller_key: caller_class.to_string(),
            credential: bearer_credential(headers),
            correlation_id: correlation_id(headers),
        }
    }
}

pub struct Gateway {
    limiter: RateLimiter,
    authenticator: TokenAuthenticator,
    router: QueryRouter,
    engine: SyncEngine,
    backend: Arc<dyn ReadBackend>,
    clock: SharedClock,
    caller_class: String,
    ping_deadline: Duration,
}

impl Gateway {
    pub fn new<B>(
        config: &Config,
        registry: Arc<AllowlistRegistry>,
        backend: Arc<B>,
        clock: SharedClock,
    ) -> Self
    where
        B: ReadBackend + AssignmentStore + 'static,
    {
        let reads: Arc<dyn ReadBackend> = backend.clone();
        let writes: Arc<dyn AssignmentStore> = backend;

        Self {
            limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            authenticator: TokenAuthenticator::new(&config.auth, clock.clone()),
            router: QueryRouter::new(&config.query, registry, reads.clone()),
            engine: SyncEngine::new(&config.sync, writes, clock.clone()),
            backend: reads,
            clock,
            caller_class: config.auth.trusted_caller.clone(),
            ping_deadline: Duration::from_millis(config.query.deadline_ms),
        }
    }

    pub fn caller_class(&self) -> &str {
        &self.caller_class
    }

    pub fn tracked_rate_limit_keys(&self) -> usize {
        self.limiter.tracked_keys()
    }

    pub fn context(&self, headers: &HeaderMap) -> RequestContext {
        RequestContext::from_headers(headers, &self.caller_class)
    }

    /// Rate limit, then authenticate
    fn admit(&self, ctx: &RequestContext) -> Result<Authenticated, GatewayError> {
        self.limiter.check(&ctx.caller_key)?;
        let authenticated = self.authenticator.authenticate(ctx.credential.as_deref())?;
        debug!(
            correlation_id = %ctx.correlation_id,
            actor = %authenticated.actor,
            window = %authenticated.window,
            "Caller admitted"
        );
        Ok(authenticated)
    }

    /// Handle one `read` or `sync` envelope
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        body: &[u8],
    ) -> Result<GatewayResponse, GatewayError> {
        let authenticated = self.admit(ctx)?;

        match envelope::parse::<GatewayRequest>(body)? {
            GatewayRequest::Read(read) => {
                let result = self.router.execute(&read, &ctx.correlation_id).await?;
                Ok(GatewayResponse::read(&result, self.clock.now()))
            },
            GatewayRequest::Sync(sync) => {
                let request = sync.into_request()?;
                let report = self
                    .engine
                    .sync(&request, &authenticated.actor, &ctx.correlation_id)
                    .await?;
                Ok(GatewayResponse::sync(&report))
            },
        }
    }

    /// Handle a multi-entity sync; each entity commits or fails on its own
    pub async fn handle_batch(
        &self,
        ctx: &RequestContext,
        body: &[u8],
    ) -> Result<GatewayResponse, GatewayError> {
        let authenticated = self.admit(ctx)?;
        let requests = envelope::parse::<BatchEnvelope>(body)?.into_requests()?;
        let outcomes = self
            .engine
            .sync_batch(requests, &authenticated.actor, &ctx.correlation_id)
            .await?;
        Ok(GatewayResponse::batch(&outcomes))
    }

    pub async fn create_node(
        &self,
        ctx: &RequestContext,
        body: &[u8],
    ) -> Result<GatewayResponse, GatewayError> {
        let authenticated = self.admit(ctx)?;
        let node = envelope::parse::<NodeEnvelope>(body)?;
        let (id, parent_id) = node.ids()?;
        let created = self
            .engine
            .create_node(
                id,
                parent_id,
                node.attributes,
                &authenticated.actor,
                &ctx.correlation_id,
            )
            .await?;
        Ok(GatewayResponse::node(&created, StatusCode::CREATED))
    }

    pub async fn disable_node(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let authenticated = self.admit(ctx)?;
        let id = NodeId::parse(id).map_err(|e| GatewayError::malformed(e.to_string()))?;
        let node = self
            .engine
            .disable_node(&id, &authenticated.actor, &ctx.correlation_id)
            .await?;
        Ok(GatewayResponse::node(&node, StatusCode::OK))
    }

    /// Backend reachability, for health checks
    pub async fn ping(&self) -> Result<(), GatewayError> {
        match tokio::time::timeout(self.ping_deadline, self.backend.ping()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::backend_unavailable("health check timed out")),
        }
    }
}
