//! Constraint catalog
//!
//! Per-operation view over every table's foreign keys and indexes, plus the
//! reverse index "which foreign keys reference (table, column)". A catalog is
//! built fresh from the inspector whenever it is needed and is never kept
//! across DDL: names and membership shift as soon as an object is renamed.

use crate::error::ResolverResult;
use crate::inspector::SchemaInspector;
use crate::models::{ForeignKeyConstraint, Index, TableSnapshot};
use crate::naming::NamingScheme;
use std::collections::{BTreeMap, HashMap};

/// Column a reverse lookup targets unless told otherwise
pub const DEFAULT_REFERENCE_COLUMN: &str = "id";

/// Foreign keys grouped by their source table
pub type ForeignKeysBySource = BTreeMap<String, Vec<ForeignKeyConstraint>>;

#[derive(Debug, Clone)]
pub struct ConstraintCatalog {
    naming: NamingScheme,
    tables: BTreeMap<String, TableSnapshot>,
    /// (ref_table, ref_column) -> keys referencing it
    references: HashMap<(String, String), Vec<ForeignKeyConstraint>>,
}

impl ConstraintCatalog {
    pub fn from_snapshots(naming: NamingScheme, snapshots: impl IntoIterator<Item = TableSnapshot>) -> Self {
        let tables: BTreeMap<String, TableSnapshot> =
            snapshots.into_iter().map(|t| (t.name.clone(), t)).collect();

        let mut references: HashMap<(String, String), Vec<ForeignKeyConstraint>> = HashMap::new();
        for fk in tables.values().flat_map(|t| t.foreign_keys.iter()) {
            for column in &fk.ref_columns {
                let entry = references
                    .entry((fk.ref_table.clone(), column.clone()))
                    .or_default();
                if !entry.contains(fk) {
                    entry.push(fk.clone());
                }
            }
        }

        Self {
            naming,
            tables,
            references,
        }
    }

    /// Read every table the inspector knows about
    pub async fn load<I: SchemaInspector>(inspector: &I, naming: NamingScheme) -> ResolverResult<Self> {
        let mut snapshots = Vec::new();
        for name in inspector.table_names().await? {
            if let Some(snapshot) = inspector.table_schema(&name).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(Self::from_snapshots(naming, snapshots))
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    pub fn foreign_keys_on(&self, table: &str) -> &[ForeignKeyConstraint] {
        self.tables
            .get(table)
            .map(|t| t.foreign_keys.as_slice())
            .unwrap_or_default()
    }

    pub fn indexes_on(&self, table: &str) -> &[Index] {
        self.tables
            .get(table)
            .map(|t| t.indexes.as_slice())
            .unwrap_or_default()
    }

    /// True if some key on `table` has all of `columns` among its source
    /// columns. A part of a composite key counts: dropping that key is what
    /// a caller guarding on the part needs.
    pub fn does_foreign_key_exist(&self, table: &str, columns: &[String]) -> bool {
        self.find_foreign_key(table, columns).is_some()
    }

    pub fn find_foreign_key(&self, table: &str, columns: &[String]) -> Option<&ForeignKeyConstraint> {
        self.foreign_keys_on(table).iter().find(|fk| fk.covers(columns))
    }

    /// A key with the same shape as `fk`, whatever its name
    pub fn has_equivalent_foreign_key(&self, fk: &ForeignKeyConstraint) -> bool {
        self.foreign_keys_on(&fk.source_table)
            .iter()
            .any(|existing| existing.is_equivalent(fk))
    }

    pub fn does_index_exist(&self, table: &str, columns: &[String], unique: bool, fk_backed: bool) -> bool {
        let name = self.naming.index_name(table, columns, unique, fk_backed);
        self.indexes_on(table).iter().any(|i| i.name == name)
    }

    /// Name of the index over exactly `columns`: the derived plain name, then
    /// the foreign-key-backed name, then any index with the same column list
    /// and uniqueness.
    pub fn resolve_index_name(&self, table: &str, columns: &[String], unique: bool) -> Option<String> {
        let indexes = self.indexes_on(table);
        [false, true]
            .into_iter()
            .map(|fk_backed| self.naming.index_name(table, columns, unique, fk_backed))
            .find(|name| indexes.iter().any(|i| &i.name == name))
            .or_else(|| {
                indexes
                    .iter()
                    .find(|i| i.columns == columns && i.unique == unique)
                    .map(|i| i.name.clone())
            })
    }

    pub fn has_index_over(&self, table: &str, columns: &[String]) -> bool {
        self.indexes_on(table).iter().any(|i| i.columns == columns)
    }

    /// Keys in any table whose referenced table is `table` and whose
    /// referenced columns include `column`
    pub fn find_foreign_keys_to(&self, table: &str, column: &str) -> ForeignKeysBySource {
        let mut grouped = ForeignKeysBySource::new();
        if let Some(fks) = self.references.get(&(table.to_string(), column.to_string())) {
            for fk in fks {
                grouped.entry(fk.source_table.clone()).or_default().push(fk.clone());
            }
        }
        grouped
    }

    /// Keys referencing any column of `table`
    pub fn find_all_foreign_keys_to(&self, table: &str) -> ForeignKeysBySource {
        let mut grouped = ForeignKeysBySource::new();
        for fk in self.tables.values().flat_map(|t| t.foreign_keys.iter()) {
            if fk.ref_table == table {
                grouped.entry(fk.source_table.clone()).or_default().push(fk.clone());
            }
        }
        grouped
    }
}
