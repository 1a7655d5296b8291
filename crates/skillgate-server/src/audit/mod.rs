//! Audit logging module
//!
//! Every mutating call produces exactly one immutable [`AuditRecord`] per
//! changed row: assignment creates, updates and supersessions from the sync
//! engine, and node creation/disabling from hierarchy administration. Reads
//! are never audited.
//!
//! Records are built by an [`AuditLogger`] scoped to one mutation and
//! persisted by the store inside the same transaction as the data, so the two
//! can never diverge. The `audit_records` table is append-only.

mod logger;
mod models;
pub(crate) mod queries;

pub use logger::{emit, AuditLogger, ASSIGNMENTS_TABLE, HIERARCHY_NODES_TABLE};
pub use models::{AuditOperation, AuditRecord, AuditTarget, MutationContext};
