//! PostgreSQL backing store
//!
//! Reads are runtime-built parameterized statements; every identifier in them
//! has already been vetted by the allowlist and is double-quoted, every value
//! is a bind parameter. A sync apply runs in one transaction that is rolled
//! back on any failed guard, error or dropped future.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use skillgate_common::types::{Assignment, EntityId, HierarchyNode, NodeId, ProficiencyLevel};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, Postgres, Row as _, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::{debug, info};

use super::{AssignmentStore, NewNode, ReadBackend, Row, StoreError};
use crate::audit::{self, queries, AuditLogger, AuditRecord, MutationContext};
use crate::config::DatabaseConfig;
use crate::hierarchy;
use crate::query::{ProcedureCall, Scalar, SelectStatement};
use crate::sync::{AppliedChange, ApplyOutcome, ChangeKind, SyncConflict, SyncPlan};

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    entity_id: String,
    node_id: String,
    proficiency_level: i16,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Assignment {
            entity_id: EntityId::parse(&row.entity_id)?,
            node_id: NodeId::parse(&row.node_id)?,
            proficiency_level: ProficiencyLevel::try_from(i64::from(row.proficiency_level))?,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    id: String,
    parent_id: Option<String>,
    level: i16,
    attributes: JsonValue,
    disabled: bool,
}

impl TryFrom<NodeRow> for HierarchyNode {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(HierarchyNode {
            id: NodeId::parse(&row.id)?,
            parent_id: row.parent_id.as_deref().map(NodeId::parse).transpose()?,
            level: u8::try_from(row.level)
                .map_err(|_| StoreError::Malformed(format!("node {} has level {}", row.id, row.level)))?,
            attributes: match row.attributes {
                JsonValue::Object(map) => map,
                _ => Map::new(),
            },
            disabled: row.disabled,
        })
    }
}

const NODE_SELECT: &str = "SELECT id, parent_id, level, attributes, disabled FROM hierarchy_nodes";

#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connect, then bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database connection pool created"
        );

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        args: &[&Scalar],
    ) -> Result<Vec<Row>, StoreError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind_scalar(query, arg);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }
}

fn bind_scalar<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Scalar,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Scalar::Text(s) => query.bind(s.as_str()),
        Scalar::Int(i) => query.bind(*i),
        Scalar::Float(f) => query.bind(*f),
        Scalar::Bool(b) => query.bind(*b),
    }
}

fn row_to_json(row: &PgRow) -> Result<Row, StoreError> {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = postgres_value_to_json(row, idx, column.type_info().name())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

/// Convert a PostgreSQL value to JSON
fn postgres_value_to_json(row: &PgRow, idx: usize, type_name: &str) -> Result<JsonValue, StoreError> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(JsonValue::Null);
    }

    let value = match type_name {
        "BOOL" => JsonValue::Bool(row.try_get(idx)?),
        "INT2" => JsonValue::from(row.try_get::<i16, _>(idx)?),
        "INT4" => JsonValue::from(row.try_get::<i32, _>(idx)?),
        "INT8" => JsonValue::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => serde_json::json!(row.try_get::<f32, _>(idx)?),
        "FLOAT8" => serde_json::json!(row.try_get::<f64, _>(idx)?),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => JsonValue::String(row.try_get(idx)?),
        "TEXT[]" | "VARCHAR[]" => serde_json::json!(row.try_get::<Vec<String>, _>(idx)?),
        "UUID" => JsonValue::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => serde_json::json!(row.try_get::<DateTime<Utc>, _>(idx)?),
        "TIMESTAMP" => JsonValue::String(row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string()),
        "DATE" => JsonValue::String(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "JSON" | "JSONB" => row.try_get(idx)?,
        other => {
            return Err(StoreError::Malformed(format!(
                "column {} has unsupported type {other}",
                row.columns()[idx].name()
            )))
        },
    };

    Ok(value)
}

fn is_undefined_function(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(sqlx::Error::Database(db)) if db.code().as_deref() == Some("42883")
    )
}

#[async_trait]
impl ReadBackend for PgBackend {
    async fn select(&self, statement: &SelectStatement) -> Result<Vec<Row>, StoreError> {
        let sql = statement.to_sql();
        debug!(sql = %sql, "Direct select");

        self.fetch_rows(&sql, &statement.binds()).await.map_err(|err| {
            // operator mismatches between a column and a bound value
            if is_undefined_function(&err) {
                StoreError::Malformed(err.to_string())
            } else {
                err
            }
        })
    }

    async fn call_procedure(&self, call: &ProcedureCall) -> Result<Vec<Row>, StoreError> {
        let sql = call.to_sql();
        debug!(sql = %sql, procedure = %call.name, "Procedure call");

        let args: Vec<&Scalar> = call.args.iter().collect();
        self.fetch_rows(&sql, &args).await.map_err(|err| {
            if is_undefined_function(&err) {
                StoreError::NotFound(err.to_string())
            } else {
                err
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn lock_node(conn: &mut PgConnection, id: &NodeId) -> Result<Option<HierarchyNode>, StoreError> {
    let row = sqlx::query_as::<_, NodeRow>(&format!("{NODE_SELECT} WHERE id = $1 FOR UPDATE"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(HierarchyNode::try_from).transpose()
}

/// Hold `FOR SHARE` locks on sync targets until commit
///
/// Concurrent syncs share the locks; `disable_node` waits for them.
async fn share_nodes(conn: &mut PgConnection, ids: &[String]) -> Result<Vec<HierarchyNode>, StoreError> {
    let rows = sqlx::query_as::<_, NodeRow>(&format!(
        "{NODE_SELECT} WHERE id = ANY($1) ORDER BY id FOR SHARE"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(HierarchyNode::try_from).collect()
}

/// Retire the active version if it is still `expected_version`
async fn supersede_guarded(
    conn: &mut PgConnection,
    entity_id: &EntityId,
    node_id: &NodeId,
    expected_version: i64,
    at: DateTime<Utc>,
) -> Result<Option<Assignment>, StoreError> {
    let row = sqlx::query_as::<_, AssignmentRow>(
        r#"
        UPDATE assignment_versions
        SET superseded_at = $4
        WHERE entity_id = $1 AND node_id = $2 AND version = $3 AND superseded_at IS NULL
        RETURNING entity_id, node_id, proficiency_level, version, updated_at
        "#,
    )
    .bind(entity_id.as_str())
    .bind(node_id.as_str())
    .bind(expected_version)
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Assignment::try_from).transpose()
}

/// Insert a new active version; `None` when one already exists
async fn insert_version(
    conn: &mut PgConnection,
    entity_id: &EntityId,
    node_id: &NodeId,
    level: ProficiencyLevel,
    at: DateTime<Utc>,
) -> Result<Option<Assignment>, StoreError> {
    let row = sqlx::query_as::<_, AssignmentRow>(
        r#"
        INSERT INTO assignment_versions (entity_id, node_id, proficiency_level, version, updated_at)
        SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1, $4
        FROM assignment_versions
        WHERE entity_id = $1 AND node_id = $2
        ON CONFLICT (entity_id, node_id) WHERE superseded_at IS NULL DO NOTHING
        RETURNING entity_id, node_id, proficiency_level, version, updated_at
        "#,
    )
    .bind(entity_id.as_str())
    .bind(node_id.as_str())
    .bind(level.ordinal())
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Assignment::try_from).transpose()
}

#[async_trait]
impl AssignmentStore for PgBackend {
    async fn entity_exists(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM entities WHERE id = $1)",
        )
        .bind(entity_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn load_nodes(&self, ids: &[NodeId]) -> Result<Vec<HierarchyNode>, StoreError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, NodeRow>(&format!("{NODE_SELECT} WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(HierarchyNode::try_from).collect()
    }

    async fn load_active_assignments(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT entity_id, node_id, proficiency_level, version, updated_at
            FROM assignments
            WHERE entity_id = $1
            ORDER BY node_id
            "#,
        )
        .bind(entity_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Assignment::try_from).collect()
    }

    async fn apply_sync(
        &self,
        plan: &SyncPlan,
        context: &MutationContext,
    ) -> Result<ApplyOutcome, StoreError> {
        let entity = &plan.entity_id;
        let mut tx = self.pool.begin().await?;
        let mut logger = AuditLogger::new(context.clone());
        let mut changes = Vec::with_capacity(plan.change_count());
        let mut conflicts = Vec::new();

        // Nodes may have been disabled since the plan was read
        let targets: Vec<&NodeId> = plan
            .to_update
            .iter()
            .map(|u| &u.node_id)
            .chain(plan.to_create.iter().map(|c| &c.node_id))
            .collect();
        let ids: Vec<String> = targets.iter().map(|id| id.as_str().to_string()).collect();
        let nodes = share_nodes(&mut tx, &ids).await?;
        for node_id in targets {
            let node = nodes.iter().find(|n| &n.id == node_id);
            if let Some(conflict) = SyncConflict::unusable_node(node_id, node) {
                conflicts.push(conflict);
            }
        }
        if !conflicts.is_empty() {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Conflicted(conflicts));
        }

        for update in &plan.to_update {
            let Some(before) =
                supersede_guarded(&mut tx, entity, &update.node_id, update.expected_version, context.at)
                    .await?
            else {
                conflicts.push(SyncConflict::version_mismatch(
                    update.node_id.clone(),
                    update.expected_version,
                ));
                continue;
            };

            match insert_version(&mut tx, entity, &update.node_id, update.to, context.at).await? {
                Some(after) => {
                    logger.assignment_updated(&before, &after);
                    changes.push(AppliedChange {
                        node_id: update.node_id.clone(),
                        kind: ChangeKind::Update,
                        version: after.version,
                    });
                },
                None => conflicts.push(SyncConflict::version_mismatch(
                    update.node_id.clone(),
                    update.expected_version,
                )),
            }
        }

        for supersede in &plan.to_supersede {
            match supersede_guarded(
                &mut tx,
                entity,
                &supersede.node_id,
                supersede.expected_version,
                context.at,
            )
            .await?
            {
                Some(before) => {
                    logger.assignment_superseded(&before);
                    changes.push(AppliedChange {
                        node_id: supersede.node_id.clone(),
                        kind: ChangeKind::Supersede,
                        version: before.version,
                    });
                },
                None => conflicts.push(SyncConflict::version_mismatch(
                    supersede.node_id.clone(),
                    supersede.expected_version,
                )),
            }
        }

        for create in &plan.to_create {
            match insert_version(&mut tx, entity, &create.node_id, create.proficiency_level, context.at)
                .await?
            {
                Some(after) => {
                    logger.assignment_created(&after);
                    changes.push(AppliedChange {
                        node_id: create.node_id.clone(),
                        kind: ChangeKind::Create,
                        version: after.version,
                    });
                },
                None => conflicts.push(SyncConflict::new(
                    create.node_id.clone(),
                    crate::ErrorKind::Conflict,
                    "an active assignment was created concurrently",
                )),
            }
        }

        if !conflicts.is_empty() {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Conflicted(conflicts));
        }

        let records = logger.into_records();
        queries::insert_audit_records(&mut tx, &records).await?;
        tx.commit().await?;

        audit::emit(&records);
        Ok(ApplyOutcome::Applied(changes))
    }

    async fn create_node(
        &self,
        node: &NewNode,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM hierarchy_nodes WHERE id = $1)",
        )
        .bind(node.id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            return Err(StoreError::Malformed(format!("node {} already exists", node.id)));
        }

        let parent = match &node.parent_id {
            Some(parent_id) => Some(
                lock_node(&mut tx, parent_id)
                    .await?
                    .filter(|p| !p.disabled)
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("parent node {parent_id} not found"))
                    })?,
            ),
            None => None,
        };
        let level = hierarchy::level_for_child(parent.as_ref())?;

        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            INSERT INTO hierarchy_nodes (id, parent_id, level, attributes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, parent_id, level, attributes, disabled
            "#,
        )
        .bind(node.id.as_str())
        .bind(node.parent_id.as_ref().map(NodeId::as_str))
        .bind(i16::from(level))
        .bind(JsonValue::Object(node.attributes.clone()))
        .fetch_one(&mut *tx)
        .await?;
        let created = HierarchyNode::try_from(row)?;

        let mut logger = AuditLogger::new(context.clone());
        logger.node_created(&created);
        let records = logger.into_records();
        queries::insert_audit_records(&mut tx, &records).await?;
        tx.commit().await?;

        audit::emit(&records);
        Ok(created)
    }

    async fn disable_node(
        &self,
        id: &NodeId,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError> {
        let mut tx = self.pool.begin().await?;

        let before = lock_node(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {id} not found")))?;
        if before.disabled {
            tx.rollback().await?;
            return Ok(before);
        }

        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            UPDATE hierarchy_nodes SET disabled = TRUE
            WHERE id = $1
            RETURNING id, parent_id, level, attributes, disabled
            "#,
        )
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let after = HierarchyNode::try_from(row)?;

        let mut logger = AuditLogger::new(context.clone());
        logger.node_disabled(&before, &after);
        let records = logger.into_records();
        queries::insert_audit_records(&mut tx, &records).await?;
        tx.commit().await?;

        audit::emit(&records);
        Ok(after)
    }

    async fn audit_records_for(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(queries::audit_records_for_entity(&self.pool, entity_id).await?)
    }
}
