//! Read plans
//!
//! A plan is the fully vetted, backend-neutral form of a read: every name in
//! it has passed the allowlist, and every value is a bind parameter. Which
//! variant is produced is decided by the table's declared [`TableRoute`], never
//! by inspecting the request.

use crate::allowlist::{ProcedureRoute, TablePolicy, TableRoute};

use super::request::{FilterPredicate, Scalar};
use super::QueryError;

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn projection(columns: &Option<Vec<String>>) -> String {
    match columns {
        Some(columns) if !columns.is_empty() => columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    }
}

/// Parameterized `SELECT` against one table
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    /// `None` selects every column
    pub columns: Option<Vec<String>>,
    pub predicates: Vec<FilterPredicate>,
    pub limit: u32,
}

impl SelectStatement {
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", projection(&self.columns), quote(&self.table));

        let mut bind = 0;
        let conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|predicate| match predicate {
                FilterPredicate::Compare { column, op, .. } => {
                    bind += 1;
                    format!("{} {} ${bind}", quote(column), op.sql())
                },
                FilterPredicate::IsNull { column } => format!("{} IS NULL", quote(column)),
            })
            .collect();

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" LIMIT {}", self.limit));
        sql
    }

    /// Values in bind order
    pub fn binds(&self) -> Vec<&Scalar> {
        self.predicates
            .iter()
            .filter_map(|p| match p {
                FilterPredicate::Compare { value, .. } => Some(value),
                FilterPredicate::IsNull { .. } => None,
            })
            .collect()
    }
}

/// Call of a named set-returning procedure
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    pub name: String,
    pub args: Vec<Scalar>,
    pub columns: Option<Vec<String>>,
    pub limit: u32,
}

impl ProcedureCall {
    pub fn to_sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.args.len()).map(|i| format!("${i}")).collect();
        format!(
            "SELECT {} FROM {}({}) LIMIT {}",
            projection(&self.columns),
            quote(&self.name),
            placeholders.join(", "),
            self.limit
        )
    }
}

/// How one read will be dispatched
#[derive(Debug, Clone, PartialEq)]
pub enum ReadPlan {
    Direct(SelectStatement),
    Procedure(ProcedureCall),
}

impl ReadPlan {
    /// Build the plan for a vetted read
    ///
    /// Procedure-routed tables take their arguments from equality filters whose
    /// keys are exactly the declared parameters.
    pub fn build(
        policy: &TablePolicy,
        columns: Option<Vec<String>>,
        predicates: Vec<FilterPredicate>,
        fetch_limit: u32,
    ) -> Result<Self, QueryError> {
        match &policy.route {
            TableRoute::Direct => Ok(Self::Direct(SelectStatement {
                table: policy.name.clone(),
                columns,
                predicates,
                limit: fetch_limit,
            })),
            TableRoute::Procedure(route) => Ok(Self::Procedure(ProcedureCall {
                name: route.name.clone(),
                args: procedure_args(&policy.name, route, &predicates)?,
                columns,
                limit: fetch_limit,
            })),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Procedure(_) => "procedure",
        }
    }
}

fn procedure_args(
    table: &str,
    route: &ProcedureRoute,
    predicates: &[FilterPredicate],
) -> Result<Vec<Scalar>, QueryError> {
    if let Some(extra) = predicates
        .iter()
        .find(|p| !route.params.iter().any(|param| param == p.column()))
    {
        return Err(QueryError::Malformed(format!(
            "'{table}' only accepts filters on {:?}, got '{}'",
            route.params,
            extra.column()
        )));
    }

    route
        .params
        .iter()
        .map(|param| {
            predicates
                .iter()
                .find(|p| p.column() == param)
                .and_then(FilterPredicate::equality_value)
                .cloned()
                .ok_or_else(|| {
                    QueryError::Malformed(format!(
                        "'{table}' requires an equality filter on '{param}'"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::{ColumnSet, Operation};
    use crate::query::request::CompareOp;
    use std::collections::HashSet;

    fn policy(route: TableRoute) -> TablePolicy {
        TablePolicy {
            name: "things".to_string(),
            operations: HashSet::from([Operation::Read]),
            columns: ColumnSet::All,
            route,
        }
    }

    fn eq(column: &str, value: Scalar) -> FilterPredicate {
        FilterPredicate::Compare {
            column: column.to_string(),
            op: CompareOp::Eq,
            value,
        }
    }

    #[test]
    fn test_select_sql_quotes_names_and_binds_values() {
        let statement = SelectStatement {
            table: "assignments".to_string(),
            columns: Some(vec!["node_id".to_string(), "version".to_string()]),
            predicates: vec![
                eq("entity_id", Scalar::Text("e1".to_string())),
                FilterPredicate::IsNull {
                    column: "superseded_at".to_string(),
                },
                FilterPredicate::Compare {
                    column: "version".to_string(),
                    op: CompareOp::Gt,
                    value: Scalar::Int(2),
                },
            ],
            limit: 11,
        };

        assert_eq!(
            statement.to_sql(),
            r#"SELECT "node_id", "version" FROM "assignments" WHERE "entity_id" = $1 AND "superseded_at" IS NULL AND "version" > $2 LIMIT 11"#
        );
        assert_eq!(statement.binds().len(), 2);
    }

    #[test]
    fn test_procedure_plan_binds_declared_params() {
        let route = TableRoute::Procedure(ProcedureRoute {
            name: "sg_hierarchy_subtree".to_string(),
            params: vec!["root_id".to_string()],
        });
        let plan = ReadPlan::build(
            &policy(route),
            None,
            vec![eq("root_id", Scalar::Text("n1".to_string()))],
            201,
        )
        .unwrap();

        let ReadPlan::Procedure(call) = plan else {
            panic!("expected procedure plan");
        };
        assert_eq!(call.to_sql(), r#"SELECT * FROM "sg_hierarchy_subtree"($1) LIMIT 201"#);
        assert_eq!(call.args, vec![Scalar::Text("n1".to_string())]);
    }

    #[test]
    fn test_procedure_plan_rejects_missing_or_extra_filters() {
        let route = TableRoute::Procedure(ProcedureRoute {
            name: "sg_hierarchy_subtree".to_string(),
            params: vec!["root_id".to_string()],
        });

        let missing = ReadPlan::build(&policy(route.clone()), None, vec![], 10);
        assert!(matches!(missing, Err(QueryError::Malformed(_))));

        let extra = ReadPlan::build(
            &policy(route),
            None,
            vec![
                eq("root_id", Scalar::Text("n1".to_string())),
                eq("level", Scalar::Int(2)),
            ],
            10,
        );
        assert!(matches!(extra, Err(QueryError::Malformed(_))));
    }

    #[test]
    fn test_direct_route_builds_select() {
        let plan = ReadPlan::build(&policy(TableRoute::Direct), None, vec![], 5).unwrap();
        assert_eq!(plan.kind(), "direct");
    }
}
