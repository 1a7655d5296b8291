//! Synchronization engine
//!
//! Owns the store handle and the backend deadline. Every store call is wrapped
//! in the deadline; an expired deadline drops the in-flight future, which rolls
//! back any open transaction.

use futures::future::join_all;
use serde_json::{Map, Value as JsonValue};
use skillgate_common::types::{HierarchyNode, NodeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::MutationContext;
use crate::auth::Actor;
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::GatewayError;
use crate::store::{AssignmentStore, NewNode, StoreError};

use super::models::{ApplyOutcome, EntitySyncOutcome, SyncPlan, SyncReport, SyncRequest};
use super::planner::plan_sync;
use super::SyncError;

pub struct SyncEngine {
    store: Arc<dyn AssignmentStore>,
    clock: SharedClock,
    max_batch_entities: usize,
    deadline: Duration,
}

impl SyncEngine {
    pub fn new(config: &SyncConfig, store: Arc<dyn AssignmentStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            max_batch_entities: config.max_batch_entities,
            deadline: Duration::from_millis(config.deadline_ms),
        }
    }

    async fn within<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(self.deadline.as_millis() as u64)),
        }
    }

    fn context(&self, actor: &Actor, correlation_id: &str) -> MutationContext {
        MutationContext::new(actor.name.clone(), correlation_id, self.clock.now())
    }

    /// Read the entity's snapshot and diff it against the desired set
    pub async fn plan(&self, request: &SyncRequest) -> Result<SyncPlan, SyncError> {
        if !self.within(self.store.entity_exists(&request.entity_id)).await? {
            return Err(SyncError::EntityNotFound(request.entity_id.clone()));
        }

        let ids: Vec<NodeId> = request
            .desired
            .iter()
            .map(|d| d.node_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let nodes: HashMap<NodeId, HierarchyNode> = self
            .within(self.store.load_nodes(&ids))
            .await?
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        let current = self
            .within(self.store.load_active_assignments(&request.entity_id))
            .await?;

        plan_sync(&request.entity_id, &request.desired, &current, &nodes)
    }

    /// Write a plan in one guarded transaction
    ///
    /// A plan carrying rejected rows, or one with nothing to change, never
    /// reaches the store.
    pub async fn apply(
        &self,
        plan: &SyncPlan,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<SyncReport, SyncError> {
        if !plan.rejected.is_empty() {
            return Ok(SyncReport {
                entity_id: plan.entity_id.clone(),
                applied: 0,
                conflicts: plan.rejected.clone(),
            });
        }
        if plan.change_count() == 0 {
            return Ok(SyncReport {
                entity_id: plan.entity_id.clone(),
                applied: 0,
                conflicts: Vec::new(),
            });
        }

        let context = self.context(actor, correlation_id);
        let report = match self.within(self.store.apply_sync(plan, &context)).await? {
            ApplyOutcome::Applied(changes) => SyncReport {
                entity_id: plan.entity_id.clone(),
                applied: changes.len(),
                conflicts: Vec::new(),
            },
            ApplyOutcome::Conflicted(conflicts) => SyncReport {
                entity_id: plan.entity_id.clone(),
                applied: 0,
                conflicts,
            },
        };
        Ok(report)
    }

    /// Plan and apply for one entity
    #[instrument(skip(self, request, actor), fields(entity_id = %request.entity_id))]
    pub async fn sync(
        &self,
        request: &SyncRequest,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        let result = match self.plan(request).await {
            Ok(plan) => self.apply(&plan, actor, correlation_id).await,
            Err(err) => Err(err),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(report) => info!(
                correlation_id,
                entity_id = %request.entity_id,
                applied = report.applied,
                conflicts = report.conflicts.len(),
                elapsed_ms,
                "Sync finished"
            ),
            Err(err) => warn!(
                correlation_id,
                entity_id = %request.entity_id,
                kind = %err.kind(),
                elapsed_ms,
                error = %err,
                "Sync failed"
            ),
        }

        result
    }

    /// Synchronize several entities, each in its own transaction
    ///
    /// Entities run concurrently. A failure for one entity is reported in its
    /// own outcome and does not affect the others. The batch itself is
    /// rejected when empty, too large, or naming an entity twice.
    pub async fn sync_batch(
        &self,
        requests: Vec<SyncRequest>,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<Vec<EntitySyncOutcome>, SyncError> {
        if requests.is_empty() {
            return Err(SyncError::Malformed("batch names no entities".to_string()));
        }
        if requests.len() > self.max_batch_entities {
            return Err(SyncError::Malformed(format!(
                "batch of {} entities exceeds the limit of {}",
                requests.len(),
                self.max_batch_entities
            )));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = requests.iter().find(|r| !seen.insert(&r.entity_id)) {
            return Err(SyncError::Malformed(format!(
                "entity {} appears more than once in the batch",
                duplicate.entity_id
            )));
        }

        let outcomes = join_all(requests.iter().map(|request| async move {
            EntitySyncOutcome {
                entity_id: request.entity_id.clone(),
                result: self
                    .sync(request, actor, correlation_id)
                    .await
                    .map_err(GatewayError::from),
            }
        }))
        .await;

        info!(
            correlation_id,
            entities = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            "Batch sync finished"
        );

        Ok(outcomes)
    }

    /// Create a hierarchy node below `parent_id`, or a root when absent
    pub async fn create_node(
        &self,
        id: Option<NodeId>,
        parent_id: Option<NodeId>,
        attributes: Map<String, JsonValue>,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<HierarchyNode, SyncError> {
        let id = match id {
            Some(id) => id,
            None => NodeId::parse(&Uuid::new_v4().to_string())
                .map_err(|e| SyncError::Malformed(e.to_string()))?,
        };
        let node = NewNode {
            id,
            parent_id,
            attributes,
        };
        let context = self.context(actor, correlation_id);
        let created = self.within(self.store.create_node(&node, &context)).await?;

        info!(
            correlation_id,
            node_id = %created.id,
            level = created.level,
            "Hierarchy node created"
        );
        Ok(created)
    }

    /// Soft-disable a node; disabling twice is a no-op
    pub async fn disable_node(
        &self,
        id: &NodeId,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<HierarchyNode, SyncError> {
        let context = self.context(actor, correlation_id);
        let node = self.within(self.store.disable_node(id, &context)).await?;
        info!(correlation_id, node_id = %node.id, "Hierarchy node disabled");
        Ok(node)
    }
}
