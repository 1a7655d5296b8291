//! Generic read requests and filter predicates

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use super::QueryError;

/// Body of a `read` envelope (minus the `operation` tag)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReadRequest {
    pub table: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<Map<String, JsonValue>>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ReadRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_filter(mut self, column: &str, value: JsonValue) -> Self {
        self.filter
            .get_or_insert_with(Map::new)
            .insert(column.to_string(), value);
        self
    }

    /// Whether the caller narrowed the projection to an explicit column subset
    pub fn has_explicit_columns(&self) -> bool {
        self.columns.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Columns referenced by the filter, in key order
    pub fn filter_columns(&self) -> Vec<String> {
        self.filter
            .as_ref()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn predicates(&self) -> Result<Vec<FilterPredicate>, QueryError> {
        let Some(filter) = &self.filter else {
            return Ok(Vec::new());
        };

        filter
            .iter()
            .map(|(column, value)| FilterPredicate::parse(column, value))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Lte => ordering != Greater,
            Self::Gt => ordering == Greater,
            Self::Gte => ordering != Less,
        }
    }
}

/// Bindable filter value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn from_json(column: &str, value: &JsonValue) -> Result<Self, QueryError> {
        match value {
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n.as_f64().map(Self::Float).ok_or_else(|| {
                    QueryError::Malformed(format!("filter on '{column}': unsupported number {n}"))
                }),
            },
            other => Err(QueryError::Malformed(format!(
                "filter on '{column}': value must be a string, number or boolean, got {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => JsonValue::from(*f),
            Self::Bool(b) => JsonValue::Bool(*b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Scalar,
    },
    IsNull {
        column: String,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OperatorFilter {
    op: CompareOp,
    value: JsonValue,
}

impl FilterPredicate {
    /// `{"col": scalar}`, `{"col": null}` or `{"col": {"op": .., "value": ..}}`
    pub fn parse(column: &str, value: &JsonValue) -> Result<Self, QueryError> {
        match value {
            JsonValue::Null => Ok(Self::IsNull {
                column: column.to_string(),
            }),
            JsonValue::Object(_) => {
                let operator: OperatorFilter =
                    serde_json::from_value(value.clone()).map_err(|e| {
                        QueryError::Malformed(format!("filter on '{column}': {e}"))
                    })?;
                Ok(Self::Compare {
                    column: column.to_string(),
                    op: operator.op,
                    value: Scalar::from_json(column, &operator.value)?,
                })
            },
            scalar => Ok(Self::Compare {
                column: column.to_string(),
                op: CompareOp::Eq,
                value: Scalar::from_json(column, scalar)?,
            }),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Compare { column, .. } | Self::IsNull { column } => column,
        }
    }

    /// Equality value, used to bind procedure parameters
    pub fn equality_value(&self) -> Option<&Scalar> {
        match self {
            Self::Compare {
                op: CompareOp::Eq,
                value,
                ..
            } => Some(value),
            _ => None,
        }
    }
}
