//! PostgreSQL backend tests
//!
//! These run against a real database via `sqlx::test` and are ignored by
//! default. Run them with `DATABASE_URL` set and `--ignored`.

use chrono::Utc;
use serde_json::{json, Map};
use skillgate_common::types::{EntityId, NodeId, ProficiencyLevel};
use sqlx::PgPool;

use skillgate_server::{
    audit::{AuditOperation, MutationContext},
    error::ErrorKind,
    query::{CompareOp, FilterPredicate, ProcedureCall, Scalar, SelectStatement},
    store::{postgres::PgBackend, AssignmentStore, NewNode, ReadBackend},
    sync::{ApplyOutcome, PlannedCreate, PlannedUpdate, SyncPlan},
};

fn ctx(correlation_id: &str) -> MutationContext {
    MutationContext::new("pg-tests", correlation_id, Utc::now())
}

fn node(raw: &str) -> NodeId {
    NodeId::parse(raw).unwrap()
}

async fn fixture(pool: &PgPool) -> PgBackend {
    let backend = PgBackend::from_pool(pool.clone());
    for (id, parent) in [("root", None), ("N1", Some("root")), ("N2", Some("root"))] {
        backend
            .create_node(
                &NewNode {
                    id: node(id),
                    parent_id: parent.map(node),
                    attributes: Map::new(),
                },
                &ctx("fixture"),
            )
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO entities (id, org_path) VALUES ('E1', ARRAY['root'])")
        .execute(pool)
        .await
        .unwrap();
    backend
}

fn create_plan(entity: &EntityId, nodes: &[(&str, i64)]) -> SyncPlan {
    SyncPlan {
        entity_id: entity.clone(),
        to_create: nodes
            .iter()
            .map(|(n, l)| PlannedCreate {
                node_id: node(n),
                proficiency_level: ProficiencyLevel::try_from(*l).unwrap(),
            })
            .collect(),
        to_update: vec![],
        to_supersede: vec![],
        rejected: vec![],
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_apply_writes_data_and_audit_together(pool: PgPool) {
    let backend = fixture(&pool).await;
    let entity = EntityId::parse("E1").unwrap();

    let outcome = backend
        .apply_sync(&create_plan(&entity, &[("N1", 2), ("N2", 3)]), &ctx("c-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied(ref changes) if changes.len() == 2));

    let active = backend.load_active_assignments(&entity).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|a| a.version == 1));

    let audit = backend.audit_records_for(&entity).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|r| r.operation == AuditOperation::AssignmentCreate));
    assert!(audit.iter().all(|r| r.correlation_id == "c-1"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_apply_rejects_node_disabled_after_planning(pool: PgPool) {
    let backend = fixture(&pool).await;
    let entity = EntityId::parse("E1").unwrap();
    let plan = create_plan(&entity, &[("N1", 2), ("N2", 3)]);

    backend.disable_node(&node("N2"), &ctx("off")).await.unwrap();

    let outcome = backend.apply_sync(&plan, &ctx("late")).await.unwrap();
    let ApplyOutcome::Conflicted(conflicts) = outcome else {
        panic!("expected a conflict");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].node_id, node("N2"));
    assert_eq!(conflicts[0].reason, ErrorKind::NotFound);

    assert!(backend.load_active_assignments(&entity).await.unwrap().is_empty());
    assert!(backend.audit_records_for(&entity).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_update_rolls_back_everything(pool: PgPool) {
    let backend = fixture(&pool).await;
    let entity = EntityId::parse("E1").unwrap();
    backend
        .apply_sync(&create_plan(&entity, &[("N1", 1)]), &ctx("seed"))
        .await
        .unwrap();

    let stale = SyncPlan {
        to_create: vec![PlannedCreate {
            node_id: node("N2"),
            proficiency_level: ProficiencyLevel::Basic,
        }],
        to_update: vec![PlannedUpdate {
            node_id: node("N1"),
            from: ProficiencyLevel::Awareness,
            to: ProficiencyLevel::Expert,
            expected_version: 7,
        }],
        ..create_plan(&entity, &[])
    };

    let outcome = backend.apply_sync(&stale, &ctx("stale")).await.unwrap();
    let ApplyOutcome::Conflicted(conflicts) = outcome else {
        panic!("expected a conflict");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].node_id, node("N1"));
    assert_eq!(conflicts[0].reason, ErrorKind::Conflict);

    let active = backend.load_active_assignments(&entity).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(backend.audit_records_for(&entity).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_direct_select_and_procedure(pool: PgPool) {
    let backend = fixture(&pool).await;

    let rows = backend
        .select(&SelectStatement {
            table: "hierarchy_nodes".to_string(),
            columns: Some(vec!["id".to_string(), "level".to_string()]),
            predicates: vec![FilterPredicate::Compare {
                column: "level".to_string(),
                op: CompareOp::Gt,
                value: Scalar::Int(0),
            }],
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["level"] == json!(1)));

    let subtree = backend
        .call_procedure(&ProcedureCall {
            name: "sg_hierarchy_subtree".to_string(),
            args: vec![Scalar::Text("root".to_string())],
            columns: None,
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(subtree.len(), 3);
    assert_eq!(subtree[0]["id"], "root");
    assert_eq!(subtree[0]["depth"], 0);

    let missing = backend
        .call_procedure(&ProcedureCall {
            name: "sg_does_not_exist".to_string(),
            args: vec![],
            columns: None,
            limit: 10,
        })
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_node_depth_and_disable(pool: PgPool) {
    let backend = fixture(&pool).await;

    let mut parent = node("N1");
    for depth in 2..=5 {
        let id = node(&format!("deep-{depth}"));
        let created = backend
            .create_node(
                &NewNode {
                    id: id.clone(),
                    parent_id: Some(parent.clone()),
                    attributes: Map::new(),
                },
                &ctx("deep"),
            )
            .await
            .unwrap();
        assert_eq!(created.level, depth);
        parent = id;
    }

    let too_deep = backend
        .create_node(
            &NewNode {
                id: node("deep-6"),
                parent_id: Some(parent),
                attributes: Map::new(),
            },
            &ctx("deep"),
        )
        .await
        .unwrap_err();
    assert_eq!(too_deep.kind(), ErrorKind::Malformed);

    let disabled = backend.disable_node(&node("N2"), &ctx("off")).await.unwrap();
    assert!(disabled.disabled);
    let again = backend.disable_node(&node("N2"), &ctx("off")).await.unwrap();
    assert!(again.disabled);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_records WHERE operation = 'node_disable'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}
