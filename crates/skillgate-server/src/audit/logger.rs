//! Audit logger
//!
//! Collects one [`AuditRecord`] per changed row during a mutation. Stores call
//! it while the transaction is open and persist [`AuditLogger::into_records`]
//! before committing, so data and audit either both land or neither does.

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use skillgate_common::types::{Assignment, HierarchyNode};
use uuid::Uuid;

use super::models::{AuditOperation, AuditRecord, AuditTarget, MutationContext};

pub const ASSIGNMENTS_TABLE: &str = "assignments";
pub const HIERARCHY_NODES_TABLE: &str = "hierarchy_nodes";

#[derive(Debug)]
pub struct AuditLogger {
    context: MutationContext,
    records: Vec<AuditRecord>,
}

impl AuditLogger {
    pub fn new(context: MutationContext) -> Self {
        Self {
            context,
            records: Vec::new(),
        }
    }

    pub fn assignment_created(&mut self, after: &Assignment) {
        self.push(
            AuditOperation::AssignmentCreate,
            assignment_target(after),
            None,
            Some(snapshot(after)),
        );
    }

    pub fn assignment_updated(&mut self, before: &Assignment, after: &Assignment) {
        self.push(
            AuditOperation::AssignmentUpdate,
            assignment_target(before),
            Some(snapshot(before)),
            Some(snapshot(after)),
        );
    }

    pub fn assignment_superseded(&mut self, before: &Assignment) {
        self.push(
            AuditOperation::AssignmentSupersede,
            assignment_target(before),
            Some(snapshot(before)),
            None,
        );
    }

    pub fn node_created(&mut self, node: &HierarchyNode) {
        self.push(
            AuditOperation::NodeCreate,
            node_target(node),
            None,
            Some(snapshot(node)),
        );
    }

    pub fn node_disabled(&mut self, before: &HierarchyNode, after: &HierarchyNode) {
        self.push(
            AuditOperation::NodeDisable,
            node_target(before),
            Some(snapshot(before)),
            Some(snapshot(after)),
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records
    }

    fn push(
        &mut self,
        operation: AuditOperation,
        target: AuditTarget,
        before_value: Option<JsonValue>,
        after_value: Option<JsonValue>,
    ) {
        self.records.push(AuditRecord {
            id: Uuid::new_v4(),
            actor: self.context.actor.clone(),
            operation,
            target,
            before_value,
            after_value,
            correlation_id: self.context.correlation_id.clone(),
            timestamp: self.context.at,
        });
    }
}

/// Log persisted records; call only after the owning transaction committed
pub fn emit(records: &[AuditRecord]) {
    for record in records {
        tracing::info!(
            audit_id = %record.id,
            actor = %record.actor,
            operation = %record.operation,
            table = %record.target.table,
            keys = %record.target.keys,
            correlation_id = %record.correlation_id,
            "Audit record written"
        );
    }
}

fn assignment_target(assignment: &Assignment) -> AuditTarget {
    AuditTarget {
        table: ASSIGNMENTS_TABLE.to_string(),
        keys: json!({
            "entity_id": assignment.entity_id,
            "node_id": assignment.node_id,
            "version": assignment.version,
        }),
    }
}

fn node_target(node: &HierarchyNode) -> AuditTarget {
    AuditTarget {
        table: HIERARCHY_NODES_TABLE.to_string(),
        keys: json!({ "node_id": node.id }),
    }
}

fn snapshot<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to snapshot audited value");
        JsonValue::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use skillgate_common::types::{EntityId, NodeId, ProficiencyLevel};

    fn context() -> MutationContext {
        MutationContext::new(
            "trusted-caller",
            "corr-1",
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap(),
        )
    }

    fn assignment(level: ProficiencyLevel, version: i64) -> Assignment {
        Assignment {
            entity_id: EntityId::parse("e1").unwrap(),
            node_id: NodeId::parse("n1").unwrap(),
            proficiency_level: level,
            version,
            updated_at: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_one_record_per_changed_row() {
        let mut logger = AuditLogger::new(context());
        logger.assignment_created(&assignment(ProficiencyLevel::Basic, 1));
        logger.assignment_updated(
            &assignment(ProficiencyLevel::Basic, 1),
            &assignment(ProficiencyLevel::Expert, 2),
        );
        logger.assignment_superseded(&assignment(ProficiencyLevel::Expert, 2));

        let records = logger.into_records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.actor == "trusted-caller"));
        assert!(records.iter().all(|r| r.correlation_id == "corr-1"));
    }

    #[test]
    fn test_supersede_snapshots_before_only() {
        let mut logger = AuditLogger::new(context());
        logger.assignment_superseded(&assignment(ProficiencyLevel::Advanced, 3));

        let record = &logger.records()[0];
        assert_eq!(record.operation, AuditOperation::AssignmentSupersede);
        assert_eq!(record.target.table, "assignments");
        assert_eq!(record.target.keys["node_id"], "n1");
        assert_eq!(record.target.keys["version"], 3);
        assert_eq!(record.before_value.as_ref().unwrap()["proficiency_level"], 4);
        assert!(record.after_value.is_none());
    }
}
