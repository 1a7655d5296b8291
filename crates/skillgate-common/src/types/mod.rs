//! Shared domain types
//!
//! The hierarchy is a fixed-depth classification tree (skills or organizational
//! units). Entities are owned by an external system of record and only joined
//! here; assignments link an entity to a node with a proficiency level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::error::{Result, SkillgateError};

/// Maximum number of levels in the hierarchy (levels 0 through 5)
pub const MAX_HIERARCHY_DEPTH: usize = 6;

/// Highest level a node may occupy
pub const MAX_NODE_LEVEL: u8 = (MAX_HIERARCHY_DEPTH - 1) as u8;

/// Maximum length of an opaque identifier
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

fn validate_identifier(kind: &str, raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Err(SkillgateError::InvalidIdentifier(format!("{kind} cannot be empty")));
    }
    if raw.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SkillgateError::InvalidIdentifier(format!(
            "{kind} exceeds {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    if raw.chars().any(char::is_control) {
        return Err(SkillgateError::InvalidIdentifier(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(())
}

/// Opaque identifier of a hierarchy node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_identifier("node id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of an entity (person/employee record)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_identifier("entity id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded proficiency ordinal stored on an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ProficiencyLevel {
    None = 0,
    Awareness = 1,
    Basic = 2,
    Intermediate = 3,
    Advanced = 4,
    Expert = 5,
}

impl ProficiencyLevel {
    pub fn ordinal(self) -> i16 {
        self as i16
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Awareness => "awareness",
            Self::Basic => "basic",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

impl TryFrom<i64> for ProficiencyLevel {
    type Error = SkillgateError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Awareness),
            2 => Ok(Self::Basic),
            3 => Ok(Self::Intermediate),
            4 => Ok(Self::Advanced),
            5 => Ok(Self::Expert),
            other => Err(SkillgateError::InvalidProficiency(other)),
        }
    }
}

impl From<ProficiencyLevel> for i64 {
    fn from(level: ProficiencyLevel) -> Self {
        level as i64
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.ordinal())
    }
}

/// One node of the classification tree
///
/// `level` is derived from the parent chain and is never supplied by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub level: u8,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
    #[serde(default)]
    pub disabled: bool,
}

/// Entity record joined from the external system of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Organizational placement, root first, at most six entries
    #[serde(default)]
    pub org_path: Vec<NodeId>,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

/// Active link between an entity and a hierarchy node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub entity_id: EntityId,
    pub node_id: NodeId,
    pub proficiency_level: ProficiencyLevel,
    /// Incremented on every superseding write; used for optimistic concurrency
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}
