//! SchemaFlow Migrate - dependency-aware schema mutations
//!
//! Renames tables and columns, and drops tables, without losing the foreign
//! keys and indexes that depend on them. Each mutation captures its
//! dependents, drops them, applies the change and recreates them under
//! freshly derived names:
//!
//! - [`naming`]: deterministic index and foreign key identifiers
//! - [`catalog`]: per-operation view of keys, indexes and reverse references
//! - [`resolver`]: the capture, mutate and restore cycle
//! - [`inspector`]: reading schema state (PostgreSQL or in memory)
//! - [`ddl`]: executing statements or recording them into migration scripts

pub mod catalog;
pub mod config;
pub mod ddl;
pub mod error;
pub mod inspector;
pub mod models;
pub mod naming;
pub mod resolver;

#[cfg(test)]
mod fixtures;

pub use catalog::ConstraintCatalog;
pub use ddl::{DdlOperation, DdlSink, MigrationScript, ScriptSink, SinkMode};
pub use error::{ResolverError, ResolverResult};
pub use inspector::{MemoryDatabase, PgSession, SchemaInspector};
pub use naming::NamingScheme;
pub use resolver::{DependencyResolver, MigrationPlan, SchemaMutation};
