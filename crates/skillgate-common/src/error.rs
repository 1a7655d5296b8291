//! Error types for Skillgate

use thiserror::Error;

/// Result type alias for Skillgate operations
pub type Result<T> = std::result::Result<T, SkillgateError>;

/// Main error type for shared Skillgate types
#[derive(Error, Debug)]
pub enum SkillgateError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Proficiency level {0} is outside the 0..=5 scale")]
    InvalidProficiency(i64),

    #[error("Hierarchy depth exceeded: {0}")]
    DepthExceeded(String),

    #[error("Hierarchy cycle detected at node {0}")]
    Cycle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
