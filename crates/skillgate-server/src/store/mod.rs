//! Backing store abstraction
//!
//! The relational store is reached through two traits: [`ReadBackend`] for the
//! generic read path and [`AssignmentStore`] for synchronization and hierarchy
//! administration. [`postgres::PgBackend`] is the production implementation;
//! [`memory::MemoryBackend`] keeps the same semantics in process for tests and
//! local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use skillgate_common::types::{Assignment, EntityId, HierarchyNode, NodeId};
use skillgate_common::SkillgateError;
use thiserror::Error;

use crate::audit::{AuditRecord, MutationContext};
use crate::error::{ErrorKind, GatewayError};
use crate::query::{ProcedureCall, SelectStatement};
use crate::sync::{ApplyOutcome, SyncPlan};

/// One result row, column name to value
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map to the caller-facing error kind
    ///
    /// Database errors are classified by SQLSTATE class: undefined objects are
    /// `NotFound`, data and syntax errors `Malformed`, connection and resource
    /// errors `BackendUnavailable`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::BackendUnavailable,
            Self::Database(err) => classify_database_error(err),
        }
    }
}

fn classify_database_error(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("42P01") | Some("42883") => ErrorKind::NotFound,
            Some("40001") | Some("40P01") | Some("23505") => ErrorKind::Conflict,
            Some(code) if code.starts_with("22") || code.starts_with("42") => ErrorKind::Malformed,
            Some(code) if code.starts_with("23") => ErrorKind::Malformed,
            _ => ErrorKind::BackendUnavailable,
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => ErrorKind::Malformed,
        _ => ErrorKind::BackendUnavailable,
    }
}

impl From<SkillgateError> for StoreError {
    fn from(err: SkillgateError) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::new(err.kind(), err.to_string())
    }
}

/// A node to be created; the level is derived by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub attributes: Map<String, JsonValue>,
}

#[async_trait]
pub trait ReadBackend: Send + Sync {
    async fn select(&self, statement: &SelectStatement) -> Result<Vec<Row>, StoreError>;

    async fn call_procedure(&self, call: &ProcedureCall) -> Result<Vec<Row>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn entity_exists(&self, entity_id: &EntityId) -> Result<bool, StoreError>;

    /// Nodes among `ids` that exist, disabled ones included
    async fn load_nodes(&self, ids: &[NodeId]) -> Result<Vec<HierarchyNode>, StoreError>;

    async fn load_active_assignments(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// Apply a plan atomically, guarded by the versions it was planned against
    ///
    /// Either every change and its audit record is committed, or nothing is
    /// and the outcome lists the rows whose guard failed.
    async fn apply_sync(
        &self,
        plan: &SyncPlan,
        context: &MutationContext,
    ) -> Result<ApplyOutcome, StoreError>;

    async fn create_node(
        &self,
        node: &NewNode,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError>;

    async fn disable_node(
        &self,
        id: &NodeId,
        context: &MutationContext,
    ) -> Result<HierarchyNode, StoreError>;

    async fn audit_records_for(&self, entity_id: &EntityId)
        -> Result<Vec<AuditRecord>, StoreError>;
}
