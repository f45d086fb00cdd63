//! Schema Introspection Module
//!
//! The read side of the resolver. An inspector turns logical table names into
//! raw ones and produces [`TableSnapshot`]s that must reflect DDL executed
//! moments earlier once refreshed.

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PgSession;

use crate::error::ResolverResult;
use crate::models::TableSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

/// `{{%name}}` (prefixed) or `{{name}}` (unprefixed) table references
static TABLE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{(%?)([^{}]+)\}\}$").expect("table reference pattern is valid"));

/// Expand a logical table reference into the raw table name
pub fn expand_table_name(name: &str, prefix: &str) -> String {
    match TABLE_REFERENCE.captures(name.trim()) {
        Some(caps) if &caps[1] == "%" => format!("{}{}", prefix, &caps[2]),
        Some(caps) => caps[2].to_string(),
        None => name.trim().to_string(),
    }
}

#[allow(async_fn_in_trait)]
pub trait SchemaInspector {
    /// Environment table prefix substituted for `%` in `{{%name}}`
    fn table_prefix(&self) -> &str;

    fn raw_table_name(&self, name: &str) -> String {
        expand_table_name(name, self.table_prefix())
    }

    /// Whether the engine creates an index as a side effect of adding a
    /// foreign key whose columns are not already indexed
    fn indexes_foreign_keys(&self) -> bool {
        false
    }

    async fn table_names(&self) -> ResolverResult<Vec<String>>;

    /// `None` when the table does not exist
    async fn table_schema(&self, name: &str) -> ResolverResult<Option<TableSnapshot>>;

    async fn refresh(&self) -> ResolverResult<()>;

    async fn refresh_table(&self, name: &str) -> ResolverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_table_name() {
        assert_eq!(expand_table_name("{{%entries}}", "craft_"), "craft_entries");
        assert_eq!(expand_table_name("{{entries}}", "craft_"), "entries");
        assert_eq!(expand_table_name("craft_entries", "craft_"), "craft_entries");
        assert_eq!(expand_table_name(" {{%entries}} ", ""), "entries");
    }
}
