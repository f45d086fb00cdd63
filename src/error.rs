//! Error handling module
//!
//! Provides the unified error type for every resolver operation. There is no
//! partial-success value: an operation either finishes its capture, mutate
//! and restore cycle or returns one of these.

use thiserror::Error;

/// Boxed driver or engine error carried by [`ResolverError::DdlExecution`]
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Resolver-wide error type
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema inconsistency: {0}")]
    SchemaInconsistency(String),

    #[error("DDL failed on table '{table}' ({context}): {source}")]
    DdlExecution {
        table: String,
        context: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Invalid foreign key: {0}")]
    InvalidForeignKey(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Migration script error: {0}")]
    Script(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolverError {
    /// Wrap a driver or engine error with the failing statement's context
    pub fn ddl(table: impl Into<String>, context: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        ResolverError::DdlExecution {
            table: table.into(),
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Result type alias for resolver operations
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Helper function to create a not found error
pub fn not_found(msg: impl Into<String>) -> ResolverError {
    ResolverError::NotFound(msg.into())
}

/// Helper function to create a schema inconsistency error
pub fn inconsistency(msg: impl Into<String>) -> ResolverError {
    ResolverError::SchemaInconsistency(msg.into())
}

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> ResolverError {
    ResolverError::Validation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_error_carries_table_context() {
        let err = ResolverError::ddl("entries", "Drop index entries_slug_idx", "index is in use");
        let rendered = err.to_string();

        assert!(rendered.contains("entries"));
        assert!(rendered.contains("Drop index entries_slug_idx"));
        assert!(rendered.contains("index is in use"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
