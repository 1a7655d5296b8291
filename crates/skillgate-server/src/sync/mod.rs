//! Hierarchical bulk synchronization
//!
//! A synchronization replaces the active assignment set of one entity with a
//! desired set. It runs in two phases:
//!
//! 1. **Plan** - read the active assignments (with their versions) and diff
//!    them against the desired set into disjoint create/update/supersede sets
//! 2. **Apply** - write every change in one transaction, each guarded by the
//!    version read in phase 1
//!
//! If any guard fails the whole transaction is rolled back and the report
//! lists the conflicting nodes. The engine never retries; callers re-read and
//! resubmit.

pub mod engine;
pub mod models;
pub mod planner;

use skillgate_common::types::EntityId;
use thiserror::Error;

use crate::error::{ErrorKind, GatewayError};
use crate::store::StoreError;

pub use engine::SyncEngine;
pub use models::{
    AppliedChange, ApplyOutcome, ChangeKind, DesiredAssignment, EntitySyncOutcome,
    PlannedCreate, PlannedSupersede, PlannedUpdate, SyncConflict, SyncPlan, SyncReport,
    SyncRequest,
};
pub use planner::plan_sync;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("Malformed sync request: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Backing store did not answer within {0}ms")]
    Timeout(u64),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EntityNotFound(_) => ErrorKind::NotFound,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::Store(err) => err.kind(),
            Self::Timeout(_) => ErrorKind::BackendUnavailable,
        }
    }
}

impl From<SyncError> for GatewayError {
    fn from(err: SyncError) -> Self {
        GatewayError::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let entity = EntityId::parse("e-404").unwrap();
        assert_eq!(SyncError::EntityNotFound(entity).kind(), ErrorKind::NotFound);
        assert_eq!(SyncError::Timeout(50).kind(), ErrorKind::BackendUnavailable);
        assert_eq!(
            SyncError::Store(StoreError::Conflict("raced".into())).kind(),
            ErrorKind::Conflict
        );

        let gateway: GatewayError = SyncError::Malformed("bad".into()).into();
        assert_eq!(gateway.kind, ErrorKind::Malformed);
    }
}
