//! Migration plans
//!
//! A plan is a named, ordered list of schema mutations read from JSON:
//!
//! ```json
//! {
//!   "name": "rename_categories",
//!   "mutations": [
//!     { "action": "rename_table", "oldName": "{{%categories}}", "newName": "{{%sections}}" },
//!     { "action": "rename_column", "table": "{{%entries}}", "oldName": "categoryId", "newName": "sectionId" },
//!     { "action": "drop_table", "table": "{{%legacy}}" }
//!   ]
//! }
//! ```

use super::DependencyResolver;
use crate::ddl::DdlSink;
use crate::error::{validation_error, ResolverResult};
use crate::inspector::{expand_table_name, SchemaInspector};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use validator::{Validate, ValidationError};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]*$").expect("identifier pattern is valid"));

/// Identifiers must start with a letter or underscore and contain only
/// letters, digits, underscores and dollar signs
fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if !IDENTIFIER.is_match(name) {
        let mut err = ValidationError::new("invalid_identifier");
        err.message = Some(format!("'{}' is not a valid identifier", name).into());
        return Err(err);
    }
    Ok(())
}

/// Like [`validate_identifier`], after unwrapping `{{%name}}` / `{{name}}`
fn validate_table_reference(name: &str) -> Result<(), ValidationError> {
    validate_identifier(&expand_table_name(name, ""))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenameTableMutation {
    #[validate(custom(function = "validate_table_reference"))]
    pub old_name: String,
    #[validate(custom(function = "validate_table_reference"))]
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenameColumnMutation {
    #[validate(custom(function = "validate_table_reference"))]
    pub table: String,
    #[validate(length(min = 1, max = 63, message = "Column name must be between 1 and 63 characters"))]
    #[validate(custom(function = "validate_identifier"))]
    pub old_name: String,
    #[validate(length(min = 1, max = 63, message = "Column name must be between 1 and 63 characters"))]
    #[validate(custom(function = "validate_identifier"))]
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DropTableMutation {
    #[validate(custom(function = "validate_table_reference"))]
    pub table: String,
}

/// One plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchemaMutation {
    RenameTable(RenameTableMutation),
    RenameColumn(RenameColumnMutation),
    DropTable(DropTableMutation),
}

impl SchemaMutation {
    pub fn description(&self) -> String {
        match self {
            SchemaMutation::RenameTable(m) => format!("Rename table {} to {}", m.old_name, m.new_name),
            SchemaMutation::RenameColumn(m) => {
                format!("Rename column {}.{} to {}", m.table, m.old_name, m.new_name)
            }
            SchemaMutation::DropTable(m) => format!("Drop table {}", m.table),
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, SchemaMutation::DropTable(_))
    }

    fn check(&self) -> ResolverResult<()> {
        let result = match self {
            SchemaMutation::RenameTable(m) => m.validate(),
            SchemaMutation::RenameColumn(m) => m.validate(),
            SchemaMutation::DropTable(m) => m.validate(),
        };
        result.map_err(|e| validation_error(format!("{}: {}", self.description(), e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MigrationPlan {
    #[validate(length(min = 1, max = 64, message = "Plan name must be between 1 and 64 characters"))]
    #[validate(custom(function = "validate_identifier"))]
    pub name: String,
    #[validate(length(min = 1, message = "A plan needs at least one mutation"))]
    pub mutations: Vec<SchemaMutation>,
}

impl MigrationPlan {
    /// Read and validate a plan file
    pub async fn load(path: impl AsRef<Path>) -> ResolverResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let plan: MigrationPlan = serde_json::from_str(&raw)?;
        plan.check()?;
        Ok(plan)
    }

    pub fn check(&self) -> ResolverResult<()> {
        self.validate().map_err(|e| validation_error(e.to_string()))?;
        self.mutations.iter().try_for_each(SchemaMutation::check)
    }
}

impl<'a, I: SchemaInspector, S: DdlSink> DependencyResolver<'a, I, S> {
    /// Apply every mutation in order, stopping at the first failure
    pub async fn run_plan(&self, plan: &MigrationPlan) -> ResolverResult<usize> {
        info!("Running plan {} ({} mutations)", plan.name, plan.mutations.len());
        for mutation in &plan.mutations {
            self.apply(mutation).await?;
        }
        Ok(plan.mutations.len())
    }
}
