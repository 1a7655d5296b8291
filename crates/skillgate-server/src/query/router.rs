//! Read dispatch

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::allowlist::{AllowlistRegistry, Operation, TableRoute};
use crate::config::QueryConfig;
use crate::store::{ReadBackend, Row};

use super::plan::ReadPlan;
use super::request::ReadRequest;
use super::QueryError;

/// Rows returned by one read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub table: String,
    pub rows: Vec<Row>,
    /// More rows matched than the applicable ceiling allowed
    pub truncated: bool,
    /// `direct` or `procedure`
    pub dispatch: &'static str,
}

pub struct QueryRouter {
    registry: Arc<AllowlistRegistry>,
    backend: Arc<dyn ReadBackend>,
    row_ceiling: u32,
    full_width_row_limit: u32,
    deadline: Duration,
}

impl QueryRouter {
    pub fn new(
        config: &QueryConfig,
        registry: Arc<AllowlistRegistry>,
        backend: Arc<dyn ReadBackend>,
    ) -> Self {
        Self {
            registry,
            backend,
            row_ceiling: config.row_ceiling,
            full_width_row_limit: config.full_width_row_limit.min(config.row_ceiling),
            deadline: Duration::from_millis(config.deadline_ms),
        }
    }

    /// Vet, plan and dispatch one read
    ///
    /// Nothing reaches the backend unless the table, every selected column and
    /// every filter column pass the allowlist.
    #[instrument(skip(self, request), fields(table = %request.table))]
    pub async fn execute(
        &self,
        request: &ReadRequest,
        correlation_id: &str,
    ) -> Result<ReadResult, QueryError> {
        let started = Instant::now();

        let result = self.dispatch(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(read) => info!(
                correlation_id,
                table = %read.table,
                dispatch = read.dispatch,
                elapsed_ms,
                rows = read.rows.len(),
                truncated = read.truncated,
                "Read dispatched"
            ),
            Err(err) => warn!(
                correlation_id,
                table = %request.table,
                kind = %err.kind(),
                elapsed_ms,
                error = %err,
                "Read failed"
            ),
        }

        result
    }

    fn row_limit(&self, request: &ReadRequest) -> Result<u32, QueryError> {
        let ceiling = if request.has_explicit_columns() {
            self.row_ceiling
        } else {
            self.full_width_row_limit
        };

        match request.limit {
            Some(0) => Err(QueryError::Malformed("limit must be at least 1".to_string())),
            Some(limit) => Ok(limit.min(ceiling)),
            None => Ok(ceiling),
        }
    }

    async fn dispatch(&self, request: &ReadRequest) -> Result<ReadResult, QueryError> {
        let columns = request.columns.clone().filter(|c| !c.is_empty());
        let selected = columns.clone().unwrap_or_default();

        let policy = self.registry.check(&request.table, &selected, Operation::Read)?;

        let filter_columns = request.filter_columns();
        match policy.route {
            TableRoute::Direct => {
                self.registry.check(&request.table, &filter_columns, Operation::Read)?;
            },
            TableRoute::Procedure(_) => {
                if let Some(bad) = filter_columns
                    .iter()
                    .find(|c| !self.registry.is_valid_identifier(c))
                {
                    return Err(QueryError::Malformed(format!("invalid filter key '{bad}'")));
                }
            },
        }

        // Reads that name no columns see only what the table permits
        let columns = columns.or_else(|| policy.columns.projection());

        let predicates = request.predicates()?;
        let limit = self.row_limit(request)?;
        let plan = ReadPlan::build(policy, columns, predicates, limit.saturating_add(1))?;
        let dispatch = plan.kind();

        let fetch = async {
            match &plan {
                ReadPlan::Direct(statement) => self.backend.select(statement).await,
                ReadPlan::Procedure(call) => self.backend.call_procedure(call).await,
            }
        };

        let mut rows = tokio::time::timeout(self.deadline, fetch)
            .await
            .map_err(|_| {
                QueryError::BackendUnavailable(format!(
                    "read exceeded {}ms deadline",
                    self.deadline.as_millis()
                ))
            })??;

        let truncated = rows.len() > limit as usize;
        rows.truncate(limit as usize);

        Ok(ReadResult {
            table: request.table.clone(),
            rows,
            truncated,
            dispatch,
        })
    }
}
