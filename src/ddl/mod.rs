//! DDL operations and sinks
//!
//! Everything the resolver changes goes through a [`DdlSink`]. A sink either
//! executes each operation immediately or buffers it into a replayable
//! [`MigrationScript`]; the resolver is written once against the trait.

mod script;
mod sql;

pub use script::{MigrationScript, ScriptSink};
pub use sql::quote_ident;

use crate::error::ResolverResult;
use crate::models::ForeignKeyConstraint;
use serde::{Deserialize, Serialize};

/// How a sink applies operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    /// Execute against a live connection, raising on driver errors
    #[default]
    Immediate,
    /// Append to a migration script
    Script,
}

impl std::str::FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(SinkMode::Immediate),
            "script" => Ok(SinkMode::Script),
            other => Err(format!("unknown migration mode '{}'", other)),
        }
    }
}

/// A single schema-changing statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum DdlOperation {
    RenameTable { old_name: String, new_name: String },
    RenameColumn { table: String, old_name: String, new_name: String },
    DropTable { table: String },
    DropForeignKey { table: String, name: String },
    DropIndex { table: String, name: String },
    CreateIndex { table: String, name: String, columns: Vec<String>, unique: bool },
    AddForeignKey(ForeignKeyConstraint),
}

impl DdlOperation {
    /// Table the statement runs against
    pub fn table(&self) -> &str {
        match self {
            DdlOperation::RenameTable { old_name, .. } => old_name,
            DdlOperation::RenameColumn { table, .. }
            | DdlOperation::DropTable { table }
            | DdlOperation::DropForeignKey { table, .. }
            | DdlOperation::DropIndex { table, .. }
            | DdlOperation::CreateIndex { table, .. } => table,
            DdlOperation::AddForeignKey(fk) => &fk.source_table,
        }
    }

    /// Get a human-readable description of the operation
    pub fn description(&self) -> String {
        match self {
            DdlOperation::RenameTable { old_name, new_name } => {
                format!("Rename table {} to {}", old_name, new_name)
            }
            DdlOperation::RenameColumn { table, old_name, new_name } => {
                format!("Rename column {} to {} in {}", old_name, new_name, table)
            }
            DdlOperation::DropTable { table } => format!("Drop table {}", table),
            DdlOperation::DropForeignKey { table, name } => {
                format!("Drop foreign key {} from {}", name, table)
            }
            DdlOperation::DropIndex { table, name } => format!("Drop index {} from {}", name, table),
            DdlOperation::CreateIndex { table, name, columns, unique } => format!(
                "Create {}index {} on {} ({})",
                if *unique { "unique " } else { "" },
                name,
                table,
                columns.join(", ")
            ),
            DdlOperation::AddForeignKey(fk) => format!(
                "Add foreign key {} from {} ({}) to {} ({})",
                fk.name,
                fk.source_table,
                fk.source_columns.join(", "),
                fk.ref_table,
                fk.ref_columns.join(", ")
            ),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait DdlSink {
    fn mode(&self) -> SinkMode;

    async fn execute(&self, operation: &DdlOperation) -> ResolverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReferentialAction;

    #[test]
    fn test_operation_serializes_with_tag() {
        let op = DdlOperation::DropIndex {
            table: "categories".to_string(),
            name: "categories_slug_idx".to_string(),
        };
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(json["op"], "drop_index");
        assert_eq!(json["name"], "categories_slug_idx");
        assert_eq!(serde_json::from_value::<DdlOperation>(json).unwrap(), op);
    }

    #[test]
    fn test_add_foreign_key_round_trips_through_json() {
        let fk = ForeignKeyConstraint::new(
            "entries_categoryId_fk",
            "entries",
            vec!["categoryId".to_string()],
            "categories",
            vec!["id".to_string()],
            ReferentialAction::NoAction,
            ReferentialAction::Cascade,
        )
        .unwrap();
        let op = DdlOperation::AddForeignKey(fk);

        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"add_foreign_key\""));
        assert_eq!(serde_json::from_str::<DdlOperation>(&json).unwrap(), op);
        assert_eq!(op.table(), "entries");
    }

    #[test]
    fn test_sink_mode_parsing() {
        assert_eq!("Script".parse::<SinkMode>(), Ok(SinkMode::Script));
        assert_eq!("immediate".parse::<SinkMode>(), Ok(SinkMode::Immediate));
        assert!("dry-run".parse::<SinkMode>().is_err());
    }
}
