//! JSON request and response envelopes
//!
//! Identifiers and proficiency ordinals arrive as raw JSON and are validated
//! here, so everything past the envelope works with typed values.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use skillgate_common::types::{EntityId, HierarchyNode, NodeId, ProficiencyLevel};

use crate::error::GatewayError;
use crate::query::{ReadRequest, ReadResult};
use crate::sync::{DesiredAssignment, EntitySyncOutcome, SyncReport, SyncRequest};

/// Body of `POST /api/v1/gateway`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum GatewayRequest {
    Read(ReadRequest),
    Sync(SyncEnvelope),
}

impl GatewayRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Sync(_) => "sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignmentEnvelope {
    pub node_id: String,
    pub proficiency_level: i64,
}

/// Desired assignment set of one entity, as sent on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncEnvelope {
    pub entity_id: String,
    pub assignments: Vec<AssignmentEnvelope>,
}

impl SyncEnvelope {
    pub fn into_request(self) -> Result<SyncRequest, GatewayError> {
        let entity_id = EntityId::parse(&self.entity_id)
            .map_err(|e| GatewayError::malformed(e.to_string()))?;

        let desired = self
            .assignments
            .into_iter()
            .map(|row| {
                let node_id = NodeId::parse(&row.node_id)
                    .map_err(|e| GatewayError::malformed(e.to_string()))?;
                let level = ProficiencyLevel::try_from(row.proficiency_level)
                    .map_err(|e| GatewayError::malformed(format!("node {node_id}: {e}")))?;
                Ok(DesiredAssignment::new(node_id, level))
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        Ok(SyncRequest { entity_id, desired })
    }
}

/// Body of `POST /api/v1/gateway/batch`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEnvelope {
    pub entities: Vec<SyncEnvelope>,
}

impl BatchEnvelope {
    pub fn into_requests(self) -> Result<Vec<SyncRequest>, GatewayError> {
        self.entities
            .into_iter()
            .map(SyncEnvelope::into_request)
            .collect()
    }
}

/// Body of `POST /api/v1/hierarchy/nodes`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

impl NodeEnvelope {
    /// Validated `(id, parent_id)`
    pub fn ids(&self) -> Result<(Option<NodeId>, Option<NodeId>), GatewayError> {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .map(NodeId::parse)
                .transpose()
                .map_err(|e| GatewayError::malformed(e.to_string()))
        };
        Ok((parse(&self.id)?, parse(&self.parent_id)?))
    }
}

/// Decode a JSON body, reporting any shape error as `Malformed`
pub fn parse<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::malformed("request body is empty"));
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::malformed(format!("invalid request envelope: {e}")))
}

/// Status and JSON body of a successful gateway call
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: JsonValue,
}

impl GatewayResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn read(result: &ReadResult, at: DateTime<Utc>) -> Self {
        Self::ok(json!({
            "success": true,
            "data": result.rows,
            "table": result.table,
            "totalRecords": result.rows.len(),
            "truncated": result.truncated,
            "timestamp": at.to_rfc3339(),
        }))
    }

    /// Conflicting syncs answer 409 with the per-row conflicts in the body
    pub fn sync(report: &SyncReport) -> Self {
        let status = if report.is_clean() {
            StatusCode::OK
        } else {
            StatusCode::CONFLICT
        };
        Self {
            status,
            body: json!({
                "success": report.is_clean(),
                "entityId": report.entity_id,
                "applied": report.applied,
                "conflicts": report.conflicts,
            }),
        }
    }

    pub fn batch(outcomes: &[EntitySyncOutcome]) -> Self {
        let success = outcomes
            .iter()
            .all(|o| o.result.as_ref().is_ok_and(SyncReport::is_clean));
        Self::ok(json!({
            "success": success,
            "results": outcomes.iter().map(EntitySyncOutcome::to_json).collect::<Vec<_>>(),
        }))
    }

    pub fn node(node: &HierarchyNode, status: StatusCode) -> Self {
        Self {
            status,
            body: json!({ "success": true, "data": node }),
        }
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
