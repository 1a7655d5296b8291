//! Query router
//!
//! Generic reads arrive as a table name, an optional column subset and
//! optional filter predicates. The router vets every name against the
//! allowlist, turns the request into a [`ReadPlan`] and dispatches it either as
//! a direct parameterized `SELECT` or as a call to a named server-side
//! procedure, as declared for the table.
//!
//! Results are capped: reads naming an explicit column subset may return up
//! to the row ceiling, full-width reads stop at a lower limit. A capped result
//! is flagged `truncated`.

pub mod plan;
pub mod request;
pub mod router;

use thiserror::Error;

use crate::allowlist::AllowlistError;
use crate::error::{ErrorKind, GatewayError};
use crate::store::StoreError;

pub use plan::{ProcedureCall, ReadPlan, SelectStatement};
pub use request::{CompareOp, FilterPredicate, ReadRequest, Scalar};
pub use router::{QueryRouter, ReadResult};

/// Classified read failure
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    PermissionDenied(AllowlistError),

    #[error("Malformed read request: {0}")]
    Malformed(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(AllowlistError::InvalidIdentifier(_)) => ErrorKind::Malformed,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }
}

impl From<AllowlistError> for QueryError {
    fn from(err: AllowlistError) -> Self {
        Self::PermissionDenied(err)
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Malformed => Self::Malformed(message),
            _ => Self::BackendUnavailable(message),
        }
    }
}

impl From<QueryError> for GatewayError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::PermissionDenied(inner) => inner.into(),
            QueryError::NotFound(message) => GatewayError::not_found(message),
            QueryError::Malformed(message) => GatewayError::malformed(message),
            QueryError::BackendUnavailable(message) => GatewayError::backend_unavailable(message),
        }
    }
}
