//! Table, column and index models

use super::foreign_key::{replace_column, ForeignKeyConstraint};
use serde::{Deserialize, Serialize};

/// Column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// Index representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Index {
    /// True when `columns` form a leading prefix of this index
    pub fn has_leading_columns(&self, columns: &[String]) -> bool {
        !columns.is_empty()
            && columns.len() <= self.columns.len()
            && self.columns.iter().zip(columns).all(|(a, b)| a == b)
    }

    /// Same column set in any order, the match engines use when pairing a
    /// foreign key with the unique index it references
    pub fn matches_columns(&self, columns: &[String]) -> bool {
        same_column_set(&self.columns, columns)
    }

    pub fn rename_column(&mut self, old_name: &str, new_name: &str) {
        replace_column(&mut self.columns, old_name, new_name);
    }
}

fn same_column_set(a: &[String], b: &[String]) -> bool {
    !a.is_empty() && a.len() == b.len() && a.iter().all(|c| b.contains(c))
}

/// Point-in-time read of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary key and unique constraints. They belong to the table
    /// definition, so the resolver never captures or drops them.
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub indexes: Vec<Index>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique_keys: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn with_unique_key(mut self, columns: Vec<String>) -> Self {
        if !columns.is_empty() {
            self.unique_keys.push(columns);
        }
        self
    }

    /// True when a unique key or unique index spans exactly `columns`, which
    /// a foreign key needs before it may reference them
    pub fn is_referenceable(&self, columns: &[String]) -> bool {
        self.unique_keys.iter().any(|key| same_column_set(key, columns))
            || self.indexes.iter().any(|i| i.unique && i.matches_columns(columns))
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_columns() {
        let index = Index {
            name: "categories_groupId_slug_unq_idx".to_string(),
            table: "categories".to_string(),
            columns: vec!["groupId".to_string(), "slug".to_string()],
            unique: true,
        };

        assert!(index.has_leading_columns(&["groupId".to_string()]));
        assert!(index.has_leading_columns(&["groupId".to_string(), "slug".to_string()]));
        assert!(!index.has_leading_columns(&["slug".to_string()]));
        assert!(!index.has_leading_columns(&[]));
    }

    #[test]
    fn test_referenceable_columns() {
        let mut snapshot = TableSnapshot::new(
            "element_sites",
            vec![
                Column::new("id", "integer", false),
                Column::new("elementId", "integer", false),
                Column::new("siteId", "integer", false),
            ],
        )
        .with_unique_key(vec!["id".to_string()]);
        let pair = vec!["siteId".to_string(), "elementId".to_string()];

        assert!(snapshot.has_column("siteId"));
        assert!(snapshot.is_referenceable(&["id".to_string()]));
        assert!(!snapshot.is_referenceable(&pair));

        snapshot.indexes.push(Index {
            name: "element_sites_elementId_siteId_idx".to_string(),
            table: "element_sites".to_string(),
            columns: vec!["elementId".to_string(), "siteId".to_string()],
            unique: false,
        });
        assert!(!snapshot.is_referenceable(&pair));

        snapshot.indexes[0].unique = true;
        assert!(snapshot.is_referenceable(&pair));
        assert!(!snapshot.is_referenceable(&["elementId".to_string()]));
    }
}
