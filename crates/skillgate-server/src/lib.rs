//! Skillgate Server Library
//!
//! Data-access and synchronization layer for a multi-level skill/organization
//! hierarchy stored in PostgreSQL.
//!
//! # Overview
//!
//! Client applications (dashboards, reporting tools, bulk-edit UIs) never talk
//! to the database directly. Every call enters through the [`gateway`], which
//! runs a fixed pipeline:
//!
//! 1. **Rate limiting** - keyed `governor` limiter on the caller class
//! 2. **Authentication** - stateless time-window bearer credentials
//! 3. **Shape validation** - the JSON envelope must be a `read` or a `sync`
//! 4. **Allowlist** - generic reads may only touch declared tables/columns
//! 5. **Dispatch** - the [`query`] router or the [`sync`] engine
//! 6. **Audit** - every mutated row yields one immutable audit record, written
//!    in the same transaction as the data
//!
//! # Architecture
//!
//! ## Reads
//!
//! The query router turns a read envelope into either a direct parameterized
//! `SELECT` or a call to a named server-side procedure. Which one is used is
//! declared per table in the allowlist file, not decided ad hoc.
//!
//! ## Synchronization
//!
//! The sync engine diffs the desired assignment set of one entity against its
//! active assignments and applies creates, updates and supersessions in one
//! transaction guarded by per-row versions. A lost race is reported as a
//! per-row `Conflict`; the engine never retries on its own.
//!
//! ## Framework Stack
//!
//! - **Axum** for HTTP
//! - **SQLx** for PostgreSQL
//! - **Tower** for middleware
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skillgate_server::{
//!     allowlist::AllowlistRegistry, clock::SystemClock, config::Config,
//!     gateway::Gateway, store::postgres::PgBackend,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let registry = Arc::new(AllowlistRegistry::load(&config.allowlist_path)?);
//!     let backend = Arc::new(PgBackend::connect(&config.database).await?);
//!     let gateway = Gateway::new(&config, registry, backend, Arc::new(SystemClock));
//!     # let _ = gateway;
//!     Ok(())
//! }
//! ```

pub mod allowlist;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hierarchy;
pub mod middleware;
pub mod query;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use error::{ErrorKind, GatewayError};
