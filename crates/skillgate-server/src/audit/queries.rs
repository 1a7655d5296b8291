//! Database queries for audit records

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::models::{AuditRecord, AuditTarget};
use skillgate_common::types::EntityId;

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor: String,
    operation: String,
    target_table: String,
    target_keys: JsonValue,
    before_value: Option<JsonValue>,
    after_value: Option<JsonValue>,
    correlation_id: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = sqlx::Error;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditRecord {
            id: row.id,
            actor: row.actor,
            operation: row
                .operation
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            target: AuditTarget {
                table: row.target_table,
                keys: row.target_keys,
            },
            before_value: row.before_value,
            after_value: row.after_value,
            correlation_id: row.correlation_id,
            timestamp: row.timestamp,
        })
    }
}

/// Insert audit records on the caller's open transaction
pub async fn insert_audit_records(
    conn: &mut PgConnection,
    records: &[AuditRecord],
) -> Result<(), sqlx::Error> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO audit_records (
                id, actor, operation, target_table, target_keys,
                before_value, after_value, correlation_id, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.actor)
        .bind(record.operation.as_str())
        .bind(&record.target.table)
        .bind(&record.target.keys)
        .bind(&record.before_value)
        .bind(&record.after_value)
        .bind(&record.correlation_id)
        .bind(record.timestamp)
        .execute(&mut *conn)
        .await?;
    }

    debug!(count = records.len(), "Inserted audit records");

    Ok(())
}

/// Audit trail of every assignment row belonging to `entity_id`, oldest first
pub async fn audit_records_for_entity(
    pool: &PgPool,
    entity_id: &EntityId,
) -> Result<Vec<AuditRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, actor, operation, target_table, target_keys,
               before_value, after_value, correlation_id, timestamp
        FROM audit_records
        WHERE target_table = 'assignments'
          AND target_keys->>'entity_id' = $1
        ORDER BY timestamp, seq
        "#,
    )
    .bind(entity_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AuditRecord::try_from).collect()
}
