//! Synchronization data models

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use skillgate_common::types::{EntityId, HierarchyNode, NodeId, ProficiencyLevel};

use crate::error::{ErrorKind, GatewayError};

/// One (node, proficiency) pair of a desired assignment set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredAssignment {
    pub node_id: NodeId,
    pub proficiency_level: ProficiencyLevel,
}

impl DesiredAssignment {
    pub fn new(node_id: NodeId, proficiency_level: ProficiencyLevel) -> Self {
        Self {
            node_id,
            proficiency_level,
        }
    }
}

/// Desired assignment set for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub entity_id: EntityId,
    pub desired: Vec<DesiredAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCreate {
    pub node_id: NodeId,
    pub proficiency_level: ProficiencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub node_id: NodeId,
    pub from: ProficiencyLevel,
    pub to: ProficiencyLevel,
    /// Active version read when the plan was made
    pub expected_version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSupersede {
    pub node_id: NodeId,
    pub proficiency_level: ProficiencyLevel,
    pub expected_version: i64,
}

/// Changes needed to move an entity from its snapshot to the desired set
///
/// The three change sets are disjoint by node. `rejected` holds desired rows
/// that cannot be applied at all (unknown or disabled node); a plan with
/// rejections is never sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub entity_id: EntityId,
    pub to_create: Vec<PlannedCreate>,
    pub to_update: Vec<PlannedUpdate>,
    pub to_supersede: Vec<PlannedSupersede>,
    pub rejected: Vec<SyncConflict>,
}

impl SyncPlan {
    pub fn change_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_supersede.len()
    }

    pub fn is_noop(&self) -> bool {
        self.change_count() == 0 && self.rejected.is_empty()
    }
}

/// A desired row that could not be applied, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub node_id: NodeId,
    pub reason: ErrorKind,
    pub detail: String,
}

impl SyncConflict {
    pub fn new(node_id: NodeId, reason: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            node_id,
            reason,
            detail: detail.into(),
        }
    }

    pub fn version_mismatch(node_id: NodeId, expected: i64) -> Self {
        Self::new(
            node_id,
            ErrorKind::Conflict,
            format!("active version changed since version {expected} was read"),
        )
    }

    /// `NotFound` when the node is missing or disabled
    pub fn unusable_node(node_id: &NodeId, node: Option<&HierarchyNode>) -> Option<Self> {
        match node {
            None => Some(Self::new(
                node_id.clone(),
                ErrorKind::NotFound,
                format!("node {node_id} does not exist"),
            )),
            Some(node) if node.disabled => Some(Self::new(
                node_id.clone(),
                ErrorKind::NotFound,
                format!("node {node_id} is disabled"),
            )),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Supersede,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub node_id: NodeId,
    pub kind: ChangeKind,
    /// Version written (create/update) or retired (supersede)
    pub version: i64,
}

/// Result of one guarded transactional apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Vec<AppliedChange>),
    /// Rolled back; every guard that failed is listed
    Conflicted(Vec<SyncConflict>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub entity_id: EntityId,
    pub applied: usize,
    pub conflicts: Vec<SyncConflict>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Outcome of one entity inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySyncOutcome {
    pub entity_id: EntityId,
    pub result: Result<SyncReport, GatewayError>,
}

impl EntitySyncOutcome {
    pub fn to_json(&self) -> JsonValue {
        match &self.result {
            Ok(report) => json!({
                "entityId": self.entity_id,
                "success": report.is_clean(),
                "applied": report.applied,
                "conflicts": report.conflicts,
            }),
            Err(err) => {
                let mut body = err.to_json();
                body["entityId"] = json!(self.entity_id);
                body
            },
        }
    }
}
