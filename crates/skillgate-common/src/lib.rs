//! Skillgate Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging for the Skillgate workspace.
//!
//! # Overview
//!
//! - **Types**: hierarchy nodes, entities, assignments and the proficiency scale
//! - **Error Handling**: the common error and result types
//! - **Logging**: centralised `tracing` subscriber initialisation
//!
//! # Example
//!
//! ```no_run
//! use skillgate_common::types::{NodeId, ProficiencyLevel};
//!
//! fn parse() -> skillgate_common::Result<()> {
//!     let node = NodeId::parse("skill-rust")?;
//!     let level = ProficiencyLevel::try_from(3)?;
//!     println!("{node} -> {level}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SkillgateError};
