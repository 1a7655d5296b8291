//! Allowlist registry
//!
//! Static declaration of which tables, columns and operations the generic
//! read path may touch. Loaded once from a TOML file:
//!
//! ```toml
//! [tables.assignments]
//! operations = ["read"]
//! columns = ["entity_id", "node_id", "proficiency_level", "version", "updated_at"]
//!
//! [tables.hierarchy_subtree]
//! operations = ["read"]
//! columns = "all"
//! procedure = { name = "sg_hierarchy_subtree", params = ["root_id"] }
//! ```
//!
//! A table with a `procedure` is served by that named server-side procedure;
//! every other table is read with a direct parameterized `SELECT`.
//!
//! Every table, column and procedure name must match `^[A-Za-z_][A-Za-z0-9_]*$`
//! (at most 63 characters) before it can be interpolated into query text.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::error::GatewayError;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// Operation a table may be reached with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllowlistError {
    #[error("Table '{0}' is not allowlisted")]
    UnknownTable(String),

    #[error("Operation '{operation}' is not permitted on table '{table}'")]
    OperationDenied { table: String, operation: String },

    #[error("Columns not allowlisted on table '{table}': {}", columns.join(", "))]
    ColumnsDenied { table: String, columns: Vec<String> },

    #[error("Invalid identifier(s): {}", .0.join(", "))]
    InvalidIdentifier(Vec<String>),

    #[error("Invalid allowlist configuration: {0}")]
    InvalidConfig(String),
}

impl From<AllowlistError> for GatewayError {
    fn from(err: AllowlistError) -> Self {
        match err {
            AllowlistError::ColumnsDenied { ref columns, .. } => {
                let columns = columns.clone();
                GatewayError::permission_denied(err.to_string()).with_offending_columns(columns)
            },
            AllowlistError::UnknownTable(_) | AllowlistError::OperationDenied { .. } => {
                GatewayError::permission_denied(err.to_string())
            },
            AllowlistError::InvalidIdentifier(_) => GatewayError::malformed(err.to_string()),
            AllowlistError::InvalidConfig(_) => GatewayError::backend_unavailable(err.to_string()),
        }
    }
}

// ============================================================================
// File Format
// ============================================================================

/// Raw allowlist file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowlistConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, TableRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRule {
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub columns: ColumnsRule,
    #[serde(default)]
    pub procedure: Option<ProcedureRule>,
}

fn default_operations() -> Vec<Operation> {
    vec![Operation::Read]
}

/// `"all"` or an explicit list of column names
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColumnsRule {
    Keyword(String),
    List(Vec<String>),
}

impl Default for ColumnsRule {
    fn default() -> Self {
        Self::Keyword("all".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureRule {
    pub name: String,
    /// Filter keys bound, in order, as the procedure's arguments
    #[serde(default)]
    pub params: Vec<String>,
}

// ============================================================================
// Registry
// ============================================================================

/// Columns a table exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSet {
    All,
    Only(BTreeSet<String>),
}

impl ColumnSet {
    fn permits(&self, column: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(columns) => columns.contains(column),
        }
    }

    /// Explicit projection for a read that names no columns
    pub fn projection(&self) -> Option<Vec<String>> {
        match self {
            Self::All => None,
            Self::Only(columns) => Some(columns.iter().cloned().collect()),
        }
    }
}

/// Named server-side procedure serving a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureRoute {
    pub name: String,
    pub params: Vec<String>,
}

/// How reads of a table are served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRoute {
    Direct,
    Procedure(ProcedureRoute),
}

#[derive(Debug, Clone)]
pub struct TablePolicy {
    pub name: String,
    pub operations: HashSet<Operation>,
    pub columns: ColumnSet,
    pub route: TableRoute,
}

/// Immutable allowlist, built once at startup
#[derive(Debug, Clone)]
pub struct AllowlistRegistry {
    tables: HashMap<String, TablePolicy>,
    identifier: Regex,
}

impl AllowlistRegistry {
    /// Load from a TOML file, with `SKILLGATE_ALLOWLIST_` environment overrides
    pub fn load(path: &Path) -> Result<Self, AllowlistError> {
        if !path.exists() {
            return Err(AllowlistError::InvalidConfig(format!(
                "allowlist file {} does not exist",
                path.display()
            )));
        }

        let config: AllowlistConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SKILLGATE_ALLOWLIST_").split("__"))
            .extract()
            .map_err(|e| AllowlistError::InvalidConfig(e.to_string()))?;

        let registry = Self::from_config(config)?;
        tracing::info!(
            path = %path.display(),
            tables = registry.tables.len(),
            "Allowlist registry loaded"
        );
        Ok(registry)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, AllowlistError> {
        let config: AllowlistConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| AllowlistError::InvalidConfig(e.to_string()))?;
        Self::from_config(config)
    }

    pub fn from_config(config: AllowlistConfig) -> Result<Self, AllowlistError> {
        let identifier = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| AllowlistError::InvalidConfig(e.to_string()))?;

        let mut tables = HashMap::with_capacity(config.tables.len());

        for (name, rule) in config.tables {
            let mut invalid: Vec<String> = Vec::new();
            if !identifier.is_match(&name) {
                invalid.push(name.clone());
            }

            let columns = match rule.columns {
                ColumnsRule::Keyword(keyword) if keyword.eq_ignore_ascii_case("all") => {
                    ColumnSet::All
                },
                ColumnsRule::Keyword(other) => {
                    return Err(AllowlistError::InvalidConfig(format!(
                        "table '{name}': columns must be \"all\" or a list, got \"{other}\""
                    )));
                },
                ColumnsRule::List(list) => {
                    invalid.extend(list.iter().filter(|c| !identifier.is_match(c)).cloned());
                    ColumnSet::Only(list.into_iter().collect())
                },
            };

            let route = match rule.procedure {
                Some(procedure) => {
                    if !identifier.is_match(&procedure.name) {
                        invalid.push(procedure.name.clone());
                    }
                    invalid.extend(
                        procedure.params.iter().filter(|p| !identifier.is_match(p)).cloned(),
                    );
                    TableRoute::Procedure(ProcedureRoute {
                        name: procedure.name,
                        params: procedure.params,
                    })
                },
                None => TableRoute::Direct,
            };

            if !invalid.is_empty() {
                return Err(AllowlistError::InvalidConfig(format!(
                    "table '{name}': invalid identifiers {}",
                    invalid.join(", ")
                )));
            }

            tables.insert(
                name.clone(),
                TablePolicy {
                    name,
                    operations: rule.operations.into_iter().collect(),
                    columns,
                    route,
                },
            );
        }

        if tables.is_empty() {
            tracing::warn!("Allowlist registry is empty - every generic read will be denied");
        }

        Ok(Self { tables, identifier })
    }

    pub fn is_valid_identifier(&self, name: &str) -> bool {
        self.identifier.is_match(name)
    }

    pub fn is_permitted(&self, table: &str, columns: &[String], operation: Operation) -> bool {
        self.check(table, columns, operation).is_ok()
    }

    /// Resolve the policy for `table`, rejecting anything not declared
    ///
    /// Identifier syntax is checked first so that no unvetted name is echoed
    /// back into a query. Rejected columns are enumerated in the error.
    pub fn check(
        &self,
        table: &str,
        columns: &[String],
        operation: Operation,
    ) -> Result<&TablePolicy, AllowlistError> {
        let invalid: Vec<String> = std::iter::once(table)
            .chain(columns.iter().map(String::as_str))
            .filter(|name| !self.identifier.is_match(name))
            .map(str::to_string)
            .collect();
        if !invalid.is_empty() {
            return Err(AllowlistError::InvalidIdentifier(invalid));
        }

        let policy = self
            .tables
            .get(table)
            .ok_or_else(|| AllowlistError::UnknownTable(table.to_string()))?;

        if !policy.operations.contains(&operation) {
            return Err(AllowlistError::OperationDenied {
                table: table.to_string(),
                operation: operation.as_str().to_string(),
            });
        }

        let denied: Vec<String> = columns
            .iter()
            .filter(|c| !policy.columns.permits(c))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !denied.is_empty() {
            return Err(AllowlistError::ColumnsDenied {
                table: table.to_string(),
                columns: denied,
            });
        }

        Ok(policy)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TablePolicy> {
        self.tables.values()
    }
}
