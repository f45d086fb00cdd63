//! Foreign key models

use crate::error::{ResolverError, ResolverResult};
use serde::{Deserialize, Serialize};

/// Referential action for ON DELETE / ON UPDATE
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    Restrict,
    Cascade,
    SetNull,
    #[default]
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse an action keyword as reported by `information_schema`
    pub fn from_sql(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "NO ACTION" => Some(ReferentialAction::NoAction),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }

    /// Parse a `pg_constraint.confupdtype` / `confdeltype` code
    pub fn from_pg_code(code: &str) -> Option<Self> {
        match code {
            "a" => Some(ReferentialAction::NoAction),
            "r" => Some(ReferentialAction::Restrict),
            "c" => Some(ReferentialAction::Cascade),
            "n" => Some(ReferentialAction::SetNull),
            "d" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A foreign key constraint.
///
/// `source_columns` and `ref_columns` are positionally paired; order is part
/// of the key and survives every capture/restore cycle unchanged. The name is
/// whatever the catalog reported, restores always derive a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_update: ReferentialAction,
    pub on_delete: ReferentialAction,
}

/// Name-independent shape of a foreign key, used to compare catalogs
pub type ForeignKeyShape = (String, Vec<String>, String, Vec<String>, ReferentialAction, ReferentialAction);

impl ForeignKeyConstraint {
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        source_columns: Vec<String>,
        ref_table: impl Into<String>,
        ref_columns: Vec<String>,
        on_update: ReferentialAction,
        on_delete: ReferentialAction,
    ) -> ResolverResult<Self> {
        let fk = Self {
            name: name.into(),
            source_table: source_table.into(),
            source_columns,
            ref_table: ref_table.into(),
            ref_columns,
            on_update,
            on_delete,
        };
        fk.check_columns()?;
        Ok(fk)
    }

    /// Both column lists must be non-empty and of equal length
    pub fn check_columns(&self) -> ResolverResult<()> {
        if self.source_columns.is_empty() {
            return Err(ResolverError::InvalidForeignKey(format!(
                "foreign key '{}' on '{}' has no source columns",
                self.name, self.source_table
            )));
        }
        if self.source_columns.len() != self.ref_columns.len() {
            return Err(ResolverError::InvalidForeignKey(format!(
                "foreign key '{}' on '{}' pairs {} source columns with {} referenced columns",
                self.name,
                self.source_table,
                self.source_columns.len(),
                self.ref_columns.len()
            )));
        }
        Ok(())
    }

    pub fn is_self_referencing(&self) -> bool {
        self.source_table == self.ref_table
    }

    /// Whether every requested column is one of this key's source columns
    pub fn covers(&self, columns: &[String]) -> bool {
        !columns.is_empty() && columns.iter().all(|c| self.source_columns.contains(c))
    }

    pub fn references_column(&self, column: &str) -> bool {
        self.ref_columns.iter().any(|c| c == column)
    }

    /// Substitute a table name on both sides. Applying it twice is a no-op.
    pub fn rename_table(&mut self, old_name: &str, new_name: &str) {
        self.rename_source_table(old_name, new_name);
        self.rename_ref_table(old_name, new_name);
    }

    pub fn rename_source_table(&mut self, old_name: &str, new_name: &str) {
        if self.source_table == old_name {
            self.source_table = new_name.to_string();
        }
    }

    pub fn rename_ref_table(&mut self, old_name: &str, new_name: &str) {
        if self.ref_table == old_name {
            self.ref_table = new_name.to_string();
        }
    }

    pub fn rename_source_column(&mut self, old_name: &str, new_name: &str) {
        replace_column(&mut self.source_columns, old_name, new_name);
    }

    pub fn rename_ref_column(&mut self, old_name: &str, new_name: &str) {
        replace_column(&mut self.ref_columns, old_name, new_name);
    }

    /// Same key modulo its name
    pub fn is_equivalent(&self, other: &ForeignKeyConstraint) -> bool {
        self.shape() == other.shape()
    }

    pub fn shape(&self) -> ForeignKeyShape {
        (
            self.source_table.clone(),
            self.source_columns.clone(),
            self.ref_table.clone(),
            self.ref_columns.clone(),
            self.on_update,
            self.on_delete,
        )
    }
}

pub(crate) fn replace_column(columns: &mut [String], old_name: &str, new_name: &str) {
    for column in columns.iter_mut() {
        if column == old_name {
            *column = new_name.to_string();
        }
    }
}
