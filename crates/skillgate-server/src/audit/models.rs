//! Audit data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// Mutating operations that produce audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    AssignmentCreate,
    AssignmentUpdate,
    AssignmentSupersede,
    NodeCreate,
    NodeDisable,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignmentCreate => "assignment_create",
            Self::AssignmentUpdate => "assignment_update",
            Self::AssignmentSupersede => "assignment_supersede",
            Self::NodeCreate => "node_create",
            Self::NodeDisable => "node_disable",
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment_create" => Ok(Self::AssignmentCreate),
            "assignment_update" => Ok(Self::AssignmentUpdate),
            "assignment_supersede" => Ok(Self::AssignmentSupersede),
            "node_create" => Ok(Self::NodeCreate),
            "node_disable" => Ok(Self::NodeDisable),
            other => Err(format!("unknown audit operation '{other}'")),
        }
    }
}

/// Row affected by a mutation: table plus its key columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub table: String,
    pub keys: JsonValue,
}

/// Immutable audit record, written in the same transaction as the change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor: String,
    pub operation: AuditOperation,
    pub target: AuditTarget,
    pub before_value: Option<JsonValue>,
    pub after_value: Option<JsonValue>,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Who is mutating, under which request, at what time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationContext {
    pub actor: String,
    pub correlation_id: String,
    pub at: DateTime<Utc>,
}

impl MutationContext {
    pub fn new(actor: impl Into<String>, correlation_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            correlation_id: correlation_id.into(),
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trips_through_text() {
        for op in [
            AuditOperation::AssignmentCreate,
            AuditOperation::AssignmentUpdate,
            AuditOperation::AssignmentSupersede,
            AuditOperation::NodeCreate,
            AuditOperation::NodeDisable,
        ] {
            assert_eq!(op.as_str().parse::<AuditOperation>().unwrap(), op);
        }
        assert!("assignment_delete".parse::<AuditOperation>().is_err());
    }

    #[test]
    fn test_operation_serialization() {
        let json = serde_json::to_string(&AuditOperation::AssignmentSupersede).unwrap();
        assert_eq!(json, r#""assignment_supersede""#);
    }
}
