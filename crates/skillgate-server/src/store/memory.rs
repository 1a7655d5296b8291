//! In-process backing store
//!
//! Holds the tables the shipped allowlist exposes (`hierarchy_nodes`,
//! `entities`, `assignments`, `audit_records`) and the two named procedures, behind one mutex. A sync apply checks every guard
//! before touching any row, so a conflicted apply leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use skillgate_common::types::{Assignment, Entity, EntityId, HierarchyNode, NodeId, ProficiencyLevel};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

use super::{AssignmentStore, NewNode, ReadBackend, Row, StoreError};
use crate::audit::{self, AuditLogger, AuditRecord, MutationContext, ASSIGNMENTS_TABLE};
use crate::hierarchy;
use crate::query::{FilterPredicate, ProcedureCall, Scalar, SelectStatement};
use crate::sync::{AppliedChange, ApplyOutcome, ChangeKind, SyncConflict, SyncPlan};

const NODE_COLUMNS: &[&str] = &["id", "parent_id", "level", "attributes", "disabled"];
const ENTITY_COLUMNS: &[&str] = &["id", "org_path", "attributes"];
const ASSIGNMENT_COLUMNS: &[&str] =
    &["entity_id", "node_id", "proficiency_level", "version", "updated_at"];
const AUDIT_COLUMNS: &[&str] = &[
    "id",
    "actor",
    "operation",
    "target_table",
    "target_keys",
    "before_value",
    "after_value",
    "correlation_id",
    "timestamp",
];
const SUBTREE_COLUMNS: &[&str] = &["id", "parent_id", "level", "attributes", "disabled", "depth"];
const MATRIX_COLUMNS: &[&str] = &[
    "entity_id",
    "node_id",
    "node_level",
    "proficiency_level",
    "version",
    "updated_at",
];

#[derive(Debug, Clone)]
struct VersionRow {
    entity_id: EntityId,
    node_id: NodeId,
    proficiency_level: ProficiencyLevel,
    version: i64,
    updated_at: DateTime<Utc>,
    superseded_at: Option<DateTime<Utc>>,
}

impl VersionRow {
    fn is_active(&self) -> bool {
        self.superseded_at.is_none()
    }

    fn assignment(&self) -> Assignment {
        Assignment {
            entity_id: self.entity_id.clone(),
            node_id: self.node_id.clone(),
            proficiency_level: self.proficiency_level,
            version: self.version,
            updated_at: self.updated_at,
        }
    }

    fn to_row(&self) -> Row {
        let mut row = Map::new();
        row.insert("entity_id".into(), json!(self.entity_id));
        row.insert("node_id".into(), json!(self.node_id));
        row.insert("proficiency_level".into(), json!(self.proficiency_level.ordinal()));
        row.insert("version".into(), json!(self.version));
        row.insert("updated_at".into(), json!(self.updated_at));
        row
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: Vec<HierarchyNode>,
    entities: Vec<Entity>,
    versions: Vec<VersionRow>,
    audit: Vec<AuditRecord>,
}

impl MemoryState {
    fn node(&self, id: &NodeId) -> Option<&HierarchyNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    fn active_index(&self, entity_id: &EntityId, node_id: &NodeId) -> Option<usize> {
        self.versions
            .iter()
            .position(|v| v.is_active() && &v.entity_id == entity_id && &v.node_id == node_id)
    }

    fn next_version(&self, entity_id: &EntityId, node_id: &NodeId) -> i64 {
        self.versions
            .iter()
            .filter(|v| &v.entity_id == entity_id && &v.node_id == node_id)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn add_node(&mut self, node: &NewNode) -> Result<HierarchyNode, StoreError> {
        if self.node(&node.id).is_some() {
            return Err(StoreError::Malformed(format!("node {} already exists", node.id)));
        }

        let parent = match &node.parent_id {
            Some(parent_id) => {
                let parent = self
                    .node(parent_id)
                    .filter(|p| !p.disabled)
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("parent node {parent_id} not found"))
                    })?;
                hierarchy::validate_chain(parent, |id| self.node(id))?;
                Some(parent)
            },
            None => None,
        };

        let created = HierarchyNode {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            level: hierarchy::level_for_child(parent)?,
            attributes: node.attributes.clone(),
            disabled: false,
        };
        self.nodes.push(created.clone());
        Ok(created)
    }

    fn table(&self, table: &str) -> Result<(&'static [&'static str], Vec<Row>), StoreError> {
        let rows: (&'static [&'static str], Vec<Row>) = match table {
            "hierarchy_nodes" => (NODE_COLUMNS, self.nodes.iter().map(to_object).collect()),
            "entities" => (ENTITY_COLUMNS, self.entities.iter().map(to_object).collect()),
            "assignments" => (
                ASSIGNMENT_COLUMNS,
                self.versions
                    .iter()
                    .filter(|v| v.is_active())
                    .map(VersionRow::to_row)
                    .collect(),
            ),
            "audit_records" => (AUDIT_COLUMNS, self.audit.iter().map(audit_row).collect()),
            other => {
                return Err(StoreError::NotFound(format!(
                    "relation \"{other}\" does not exist"
                )))
            },
        };
        Ok(rows)
    }

    fn subtree(&self, root_id: &str) -> Vec<Row> {
        let mut rows = Vec::new();
        let mut stack: Vec<(&HierarchyNode, i64)> = self
            .nodes
            .iter()
            .filter(|n| n.id.as_str() == root_id)
            .map(|n| (n, 0))
            .collect();

        while let Some((node, depth)) = stack.pop() {
            let mut row = to_object(node);
            row.insert("depth".into(), json!(depth));
            rows.push(row);

            let children: Vec<_> = self
                .nodes
                .iter()
                .filter(|n| n.parent_id.as_ref() == Some(&node.id))
                .collect();
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
        rows
    }

    fn skill_matrix(&self, entity_id: &str) -> Vec<Row> {
        self.versions
            .iter()
            .filter(|v| v.is_active() && v.entity_id.as_str() == entity_id)
            .map(|v| {
                let mut row = v.to_row();
                let level = self.node(&v.node_id).map(|n| n.level);
                row.insert("node_level".into(), json!(level));
                row
            })
            .collect()
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Row {
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => map,
        _ => Map::new(),
    }
}

fn audit_row(record: &AuditRecord) -> Row {
    let mut row = Map::new();
    row.insert("id".into(), json!(record.id));
    row.insert("actor".into(), json!(record.actor));
    row.insert("operation".into(), json!(record.operation.as_str()));
    row.insert("target_table".into(), json!(record.target.table));
    row.insert("target_keys".into(), record.target.keys.clone());
    row.insert("before_value".into(), json!(record.before_value));
    row.insert("after_value".into(), json!(record.after_value));
    row.insert("correlation_id".into(), json!(record.correlation_id));
    row.insert("timestamp".into(), json!(record.timestamp));
    row
}

fn compare(column: &str, actual: &JsonValue, expected: &Scalar) -> Result<Option<Ordering>, StoreError> {
    let ordering = match (actual, expected) {
        (JsonValue::Null, _) => return Ok(None),
        (JsonValue::Number(n), Scalar::Int(i)) => match n.as_i64() {
            Some(v) => Some(v.cmp(i)),
            None => n.as_f64().and_then(|v| v.partial_cmp(&(*i as f64))),
        },
        (JsonValue::Number(n), Scalar::Float(f)) => n.as_f64().and_then(|v| v.partial_cmp(f)),
        (JsonValue::String(s), Scalar::Text(t)) => Some(s.as_str().cmp(t.as_str())),
        (JsonValue::Bool(b), Scalar::Bool(e)) => Some(b.cmp(e)),
        _ => {
            return Err(StoreError::Malformed(format!(
                "operator does not exist for column \"{column}\" and value {expected}"
            )))
        },
    };
    Ok(ordering)
}

fn matches(row: &Row, predicates: &[FilterPredicate]) -> Result<bool, StoreError> {
    for predicate in predicates {
        let value = row.get(predicate.column()).unwrap_or(&JsonValue::Null);
        let holds = match predicate {
            FilterPredicate::IsNull { .. } => value.is_null(),
            FilterPredicate::Compare { column, op, value: expected } => {
                compare(column, value, expected)?.is_some_and(|o| op.holds(o))
            },
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn check_columns<'a>(
    known: &[&str],
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), StoreError> {
    for name in names {
        if !known.contains(&name) {
            return Err(StoreError::Malformed(format!("column \"{name}\" does not exist")));
        }
    }
    Ok(())
}

fn project(rows: Vec<Row>, columns: &Option<Vec<String>>, limit: u32) -> Vec<Row> {
    rows.into_iter()
        .take(limit as usize)
        .map(|row| match columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(JsonValue::Null)))
                .collect(),
            _ => row,
        })
        .collect()
}

/// Seed file for development mode: nodes (parents first) and entities
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    nodes: Vec<SeedNode>,
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct SeedNode {
    id: NodeId,
    #[serde(default)]
    parent_id: Option<NodeId>,
    #[serde(default)]
    attributes: Map<String, JsonValue>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    reads: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read seed file {}: {e}", path.display()))
        })?;
        let seed: SeedFile = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Malformed(format!("invalid seed file: {e}")))?;

        let backend = Self::new();
        {
            let mut state = backend.lock();
            for node in seed.nodes {
                state.add_node(&NewNode {
                    id: node.id,
                    parent_id: node.parent_id,
                    attributes: node.attributes,
                })?;
            }
            state.entities = seed.entities;
        }
        Ok(backend)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a node without auditing, for fixtures
    pub fn insert_node(
        &self,
        id: NodeId,
        parent_id: Option<NodeId>,
    ) -> Result<HierarchyNode, StoreError> {
        self.lock().add_node(&NewNode {
            id,
            parent_id,
            attributes: Map::new(),
        })
    }

    /// Register an entity as the external system of record would
    pub fn insert_entity(&self, id: EntityId, org_path: Vec<NodeId>) {
        self.lock().entities.push(Entity {
            id,
            org_path,
            attributes: Map::new(),
        });
    }

    /// Number of reads that reached this backend
    pub fn read_count(&self) -> u64 {
        self.reads.load(AtomicOrdering::Relaxed)
    }
}

#[async_trait]
impl ReadBackend for MemoryBackend {
    async fn select(&self, statement: &SelectStatement) -> Result<Vec<Row>, StoreError> {
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
        let state = self.lock();
        let (known, rows) = state.table(&statement.table)?;

        check_columns(known, statement.predicates.iter().map(FilterPredicate::column))?;
        if let Some(columns) = &statement.columns {
            check_columns(known, columns.iter().map(String::as_str))?;
        }

        let mut selected = Vec::new();
        for row in rows {
            if matches(&row, &statement.predicates)? {
                selected.push(row);
            }
        }
        Ok(project(selected, &statement.columns, statement.limit))
    }

    async fn call_procedure(&self, call: &ProcedureCall) -> Result<Vec<Row>, StoreError> {
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
        let state = self.lock();

        let (known, rows) = match (call.name.as_str(), call.args.as_slice()) {
            ("sg_hierarchy_subtree", [Scalar::Text(root)]) => (SUBTREE_COLUMNS, state.subtree(root)),
            ("sg_entity_skill_matrix", [Scalar::Text(entity)]) => {
                (MATRIX_COLUMNS, state.skill_matrix(entity))
            },
            ("sg_hierarchy_subtree" | "sg_entity_skill_matrix", args) => {
                return Err(StoreError::Malformed(format!(
                    "function {}() expects one text argument, got {}",
                    call.name,
                    args.len()
                )))
            },
            (other, _) => {
                return Err(StoreError::NotFound(format!("function {other}() does not exist")))
            },
        };

        if let Some(columns) = &call.columns {
            check_columns(known, columns.iter().map(String::as_str))?;
        }
        Ok(project(rows, &call.columns, call.limit))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for MemoryBackend {
    async fn entity_exists(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        Ok(self.lock().entities.iter().any(|e| &e.id == entity_id))
    }

    async fn load_nodes(&self, ids: &[NodeId]) -> Result<Vec<HierarchyNode>, StoreError> {
        let state = self.lock();
        Ok(state
            .nodes
            .iter()
            .filter(|n| ids.contains(&n.id))
            .cloned()
            .collect())
    }

    async fn load_active_assignments(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.lock();
        Ok(state
            .versions
            .iter()
            .filter(|v| v.is_active() && &v.entity_id == entity_id)
            .map(VersionRow::assignment)
            .collect())
    }

    async fn apply_sync(
        &self,
        plan: &SyncPlan,
        context: &MutationContext,
    ) -> Result<ApplyOutcome, StoreError> {
        let entity = &plan.entity_id;
        let mut state = self.lock();

        let mut conflicts = Vec::new();
        let guards = plan
            .to_update
            .iter()
            .map(|u| (&u.node_id, u.expected_version))
            .chain(plan.to_supersede.iter().map(|s| (&s.node_id, s.expected_version)));
        for (node_id, expected) in guards {
            let current = state.active_index(entity, node_id).map(|i| state.versions[i].version);
            if current != Some(expected) {
                conflicts.push(SyncConflict::version_mismatch(node_id.clone(), expected));
            }
        }
        let targets = plan
            .to_update
            .iter()
            .map(|u| &u.node_id)
            .chain(plan.to_create.iter().map(|c| &c.node_id));
        for node_id in targets {
            if let Some(conflict) = SyncConflict::unusable_node(node_id, state.node(node_id)) {
                conflicts.push(conflict);
            }
        }
        for create in &plan.to_create {
            if state.active_index(entity, &create.node_id).is_some() {
                conflicts.push(SyncConflict::new(
                    create.node_id.clone(),
                    crate::ErrorKind::Conflict,
                    "an active assignment was created concurrently",
                ));
            }
        }
        if !conflicts.is_empty() {
            return Ok(ApplyOutcome::Conflicted(conflicts));
        }

        let mut logger = AuditLogger::new(context.clone());
        let mut changes = Vec::with_capacity(plan.change_count());

        for update in &plan.to_update {
            let Some(index) = state.active_index(entity, &update.node_id) else {
                continue;
            };
            let before = state.versions[index].assignment();
            state.versions[index].superseded_at = Some(context.at);

            let row = VersionRow {
                entity_id: entity.clone(),
                node_id: update.node_id.clone(),
                proficiency_level: update.to,
                version: before.version + 1,
                updated_at: context.at,
                superseded_at: None,
            };
            logger.assignment_updated(&before, &row.assignment());
            changes.push(AppliedChange {
                node_id: update.node_id.clone(),
                kind: ChangeKind::Update,
                version: row.version,
            });
            state.versions.push(row);
        }

        for supersede in &plan.to_supersede {
            let Some(index) = state.active_index(entity, &supersede.node_id) else {
                continue;
            };
            let before = state.versions[index].assignment();
            state.versions[index].superseded_at = Some(context.at);
            logger.assignment_superseded(&before);
            changes.push(AppliedChange {
                node_id: supersede.node_id.clone(),
                kind: ChangeKind::Supersede,
                version: before.version,
            });
        }

        for create in &plan.to_create {
            let row = VersionRow {
                entity_id: entity.clone(),
                node_id: create.node_id.clone(),
                proficiency_level: create.proficiency_level,
                version: state.next_version(entity, &create.node_id),
                updated_at: context.at,
                superseded_at: None,
            };
            logger.assignment_created(&row.assignment());
            changes.push(AppliedChange {
                node_id: create.node_id.clone(),
                kind: ChangeKind::Create,
                version: row.version,
            });
            state.versions.push(row);
        }

        let records = logger.into_records();
        state.audit.extend(records.iter().cloned());
        drop(state);

        audit::emit(&records);
        Ok(ApplyOutcome::Applied(changes))
    }

    async fn create_node(
        &self,
        node: &NewNode,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError> {
        let mut state = self.lock();
        let created = state.add_node(node)?;

        let mut logger = AuditLogger::new(context.clone());
        logger.node_created(&created);
        let records = logger.into_records();
        state.audit.extend(records.iter().cloned());
        drop(state);

        audit::emit(&records);
        Ok(created)
    }

    async fn disable_node(
        &self,
        id: &NodeId,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError> {
        let mut state = self.lock();
        let node = state
            .nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("node {id} not found")))?;

        if node.disabled {
            return Ok(node.clone());
        }

        let before = node.clone();
        node.disabled = true;
        let after = node.clone();

        let mut logger = AuditLogger::new(context.clone());
        logger.node_disabled(&before, &after);
        let records = logger.into_records();
        state.audit.extend(records.iter().cloned());
        drop(state);

        audit::emit(&records);
        Ok(after)
    }

    async fn audit_records_for(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.lock();
        Ok(state
            .audit
            .iter()
            .filter(|r| {
                r.target.table == ASSIGNMENTS_TABLE
                    && r.target.keys.get("entity_id").and_then(JsonValue::as_str)
                        == Some(entity_id.as_str())
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CompareOp;
    use crate::sync::{PlannedCreate, PlannedUpdate};
    use chrono::TimeZone;
    use std::io::Write;

    fn node_id(id: &str) -> NodeId {
        NodeId::parse(id).unwrap()
    }

    fn context() -> MutationContext {
        MutationContext::new(
            "tester",
            "corr",
            Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap(),
        )
    }

    fn create_plan(entity: &EntityId, node: &str, level: ProficiencyLevel) -> SyncPlan {
        SyncPlan {
            entity_id: entity.clone(),
            to_create: vec![PlannedCreate {
                node_id: node_id(node),
                proficiency_level: level,
            }],
            to_update: vec![],
            to_supersede: vec![],
            rejected: vec![],
        }
    }

    #[tokio::test]
    async fn test_node_levels_and_depth_limit() {
        let backend = MemoryBackend::new();
        let mut parent = None;
        for level in 0..6u8 {
            let node = backend.insert_node(node_id(&format!("l{level}")), parent).unwrap();
            assert_eq!(node.level, level);
            parent = Some(node.id);
        }

        let too_deep = backend
            .create_node(
                &NewNode {
                    id: node_id("l6"),
                    parent_id: parent,
                    attributes: Map::new(),
                },
                &context(),
            )
            .await;
        assert!(matches!(too_deep, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_disabled_parent_is_not_found_and_audited_once() {
        let backend = MemoryBackend::new();
        backend.insert_node(node_id("root"), None).unwrap();

        let disabled = backend.disable_node(&node_id("root"), &context()).await.unwrap();
        assert!(disabled.disabled);
        backend.disable_node(&node_id("root"), &context()).await.unwrap();

        let child = backend
            .create_node(
                &NewNode {
                    id: node_id("child"),
                    parent_id: Some(node_id("root")),
                    attributes: Map::new(),
                },
                &context(),
            )
            .await;
        assert!(matches!(child, Err(StoreError::NotFound(_))));

        let state = backend.lock();
        assert_eq!(state.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_without_side_effects() {
        let backend = MemoryBackend::new();
        let entity = EntityId::parse("e1").unwrap();
        backend.insert_entity(entity.clone(), vec![]);
        backend.insert_node(node_id("n1"), None).unwrap();
        backend.insert_node(node_id("n2"), None).unwrap();

        backend
            .apply_sync(&create_plan(&entity, "n1", ProficiencyLevel::Basic), &context())
            .await
            .unwrap();

        let stale = SyncPlan {
            entity_id: entity.clone(),
            to_create: vec![PlannedCreate {
                node_id: node_id("n2"),
                proficiency_level: ProficiencyLevel::Expert,
            }],
            to_update: vec![PlannedUpdate {
                node_id: node_id("n1"),
                from: ProficiencyLevel::Basic,
                to: ProficiencyLevel::Advanced,
                expected_version: 7,
            }],
            to_supersede: vec![],
            rejected: vec![],
        };
        let outcome = backend.apply_sync(&stale, &context()).await.unwrap();
        let ApplyOutcome::Conflicted(conflicts) = outcome else {
            panic!("expected conflict");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].node_id, node_id("n1"));

        let active = backend.load_active_assignments(&entity).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(backend.audit_records_for(&entity).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_records_are_readable() {
        let backend = MemoryBackend::new();
        backend.insert_node(node_id("n1"), None).unwrap();
        let entity = EntityId::parse("e1").unwrap();
        backend.insert_entity(entity.clone(), vec![]);
        backend
            .apply_sync(&create_plan(&entity, "n1", ProficiencyLevel::Basic), &context())
            .await
            .unwrap();

        let statement = SelectStatement {
            table: "audit_records".to_string(),
            columns: Some(vec!["operation".to_string(), "target_table".to_string()]),
            predicates: vec![],
            limit: 10,
        };
        let rows = backend.select(&statement).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["operation"], json!("assignment_create"));
        assert_eq!(rows[0]["target_table"], json!("assignments"));
    }

    #[tokio::test]
    async fn test_select_filters_and_projects() {
        let backend = MemoryBackend::new();
        backend.insert_node(node_id("root"), None).unwrap();
        backend.insert_node(node_id("a"), Some(node_id("root"))).unwrap();
        backend.insert_node(node_id("b"), Some(node_id("root"))).unwrap();

        let statement = SelectStatement {
            table: "hierarchy_nodes".to_string(),
            columns: Some(vec!["id".to_string()]),
            predicates: vec![FilterPredicate::Compare {
                column: "parent_id".to_string(),
                op: CompareOp::Eq,
                value: Scalar::Text("root".to_string()),
            }],
            limit: 10,
        };
        let rows = backend.select(&statement).await.unwrap();
        assert_eq!(rows, vec![
            Map::from_iter([("id".to_string(), json!("a"))]),
            Map::from_iter([("id".to_string(), json!("b"))]),
        ]);
        assert_eq!(backend.read_count(), 1);

        let bad_type = SelectStatement {
            predicates: vec![FilterPredicate::Compare {
                column: "level".to_string(),
                op: CompareOp::Eq,
                value: Scalar::Text("one".to_string()),
            }],
            ..statement.clone()
        };
        assert!(matches!(backend.select(&bad_type).await, Err(StoreError::Malformed(_))));

        let unknown = SelectStatement {
            table: "salaries".to_string(),
            ..statement
        };
        assert!(matches!(backend.select(&unknown).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_procedure_is_not_found() {
        let backend = MemoryBackend::new();
        let call = ProcedureCall {
            name: "sg_drop_everything".to_string(),
            args: vec![],
            columns: None,
            limit: 10,
        };
        assert!(matches!(backend.call_procedure(&call).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "nodes": [
                    {{"id": "eng"}},
                    {{"id": "rust", "parent_id": "eng", "attributes": {{"name": "Rust"}}}}
                ],
                "entities": [{{"id": "alice", "org_path": ["eng"]}}]
            }}"#
        )
        .unwrap();

        let backend = MemoryBackend::from_seed_file(file.path()).unwrap();
        assert!(backend.entity_exists(&EntityId::parse("alice").unwrap()).await.unwrap());
        let nodes = backend.load_nodes(&[node_id("rust")]).await.unwrap();
        assert_eq!(nodes[0].level, 1);
    }
}
