//! In-memory schema engine
//!
//! Serves as both [`SchemaInspector`] and immediate [`DdlSink`] so the
//! resolver can run without a live database. It enforces the rules real
//! engines apply to name-bound constraints:
//!
//! - constraint and index names must be unique
//! - a table referenced by any foreign key cannot be renamed or dropped
//! - a column mentioned by any foreign key or index cannot be renamed
//! - a foreign key needs a unique key or unique index over exactly its
//!   referenced columns, and such an index cannot be dropped while the key
//!   relies on it
//! - with `indexes_foreign_keys`, adding a foreign key creates an index named
//!   after it unless one already leads with its columns, and that index
//!   cannot be dropped while the key depends on it

use super::SchemaInspector;
use crate::ddl::{DdlOperation, DdlSink, SinkMode};
use crate::error::{ResolverError, ResolverResult};
use crate::models::foreign_key::replace_column;
use crate::models::{Column, ForeignKeyConstraint, Index, TableSnapshot};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Rejections raised by the in-memory engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    #[error("column '{column}' does not exist in '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("column '{column}' already exists in '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("constraint or index '{0}' does not exist")]
    UnknownObject(String),

    #[error("constraint or index '{0}' already exists")]
    DuplicateObject(String),

    #[error("'{object}' is still required by foreign key '{constraint}'")]
    InUse { object: String, constraint: String },

    #[error("no unique key on '{table}' matches ({columns})")]
    NotReferenceable { table: String, columns: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, TableSnapshot>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&TableSnapshot, EngineError> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableSnapshot, EngineError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))
    }

    fn require_columns(&self, table: &str, columns: &[String]) -> Result<(), EngineError> {
        let snapshot = self.table(table)?;
        match columns.iter().find(|c| !snapshot.has_column(c)) {
            Some(missing) => Err(EngineError::UnknownColumn {
                table: table.to_string(),
                column: missing.clone(),
            }),
            None => Ok(()),
        }
    }

    fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.tables.values().flat_map(|t| t.foreign_keys.iter())
    }

    fn apply(&mut self, op: &DdlOperation, indexes_foreign_keys: bool) -> Result<(), EngineError> {
        match op {
            DdlOperation::RenameTable { old_name, new_name } => {
                self.table(old_name)?;
                if self.tables.contains_key(new_name) {
                    return Err(EngineError::DuplicateTable(new_name.clone()));
                }
                if let Some(fk) = self.foreign_keys().find(|fk| &fk.ref_table == old_name) {
                    return Err(EngineError::InUse {
                        object: old_name.clone(),
                        constraint: fk.name.clone(),
                    });
                }

                let mut snapshot = self
                    .tables
                    .remove(old_name)
                    .ok_or_else(|| EngineError::UnknownTable(old_name.clone()))?;
                snapshot.name = new_name.clone();
                for index in &mut snapshot.indexes {
                    index.table = new_name.clone();
                }
                for fk in &mut snapshot.foreign_keys {
                    fk.source_table = new_name.clone();
                }
                self.tables.insert(new_name.clone(), snapshot);
            }
            DdlOperation::RenameColumn { table, old_name, new_name } => {
                let snapshot = self.table(table)?;
                self.require_columns(table, std::slice::from_ref(old_name))?;
                if snapshot.has_column(new_name) {
                    return Err(EngineError::DuplicateColumn {
                        table: table.clone(),
                        column: new_name.clone(),
                    });
                }
                if let Some(index) = snapshot.indexes.iter().find(|i| i.columns.contains(old_name)) {
                    return Err(EngineError::InUse {
                        object: format!("{}.{}", table, old_name),
                        constraint: index.name.clone(),
                    });
                }
                let blocking = self.foreign_keys().find(|fk| {
                    (&fk.source_table == table && fk.source_columns.contains(old_name))
                        || (&fk.ref_table == table && fk.references_column(old_name))
                });
                if let Some(fk) = blocking {
                    return Err(EngineError::InUse {
                        object: format!("{}.{}", table, old_name),
                        constraint: fk.name.clone(),
                    });
                }

                let snapshot = self.table_mut(table)?;
                for column in &mut snapshot.columns {
                    if &column.name == old_name {
                        column.name = new_name.clone();
                    }
                }
                for key in &mut snapshot.unique_keys {
                    replace_column(key, old_name, new_name);
                }
            }
            DdlOperation::DropTable { table } => {
                self.table(table)?;
                let blocking = self
                    .foreign_keys()
                    .find(|fk| &fk.ref_table == table && &fk.source_table != table);
                if let Some(fk) = blocking {
                    return Err(EngineError::InUse {
                        object: table.clone(),
                        constraint: fk.name.clone(),
                    });
                }
                self.tables.remove(table);
            }
            DdlOperation::DropForeignKey { table, name } => {
                let snapshot = self.table_mut(table)?;
                let position = snapshot
                    .foreign_keys
                    .iter()
                    .position(|fk| &fk.name == name)
                    .ok_or_else(|| EngineError::UnknownObject(name.clone()))?;
                snapshot.foreign_keys.remove(position);
            }
            DdlOperation::DropIndex { table, name } => {
                let snapshot = self.table(table)?;
                let index = snapshot
                    .index(name)
                    .ok_or_else(|| EngineError::UnknownObject(name.clone()))?;

                if indexes_foreign_keys {
                    for fk in &snapshot.foreign_keys {
                        let backs = index.has_leading_columns(&fk.source_columns);
                        let replaced = snapshot
                            .indexes
                            .iter()
                            .any(|other| &other.name != name && other.has_leading_columns(&fk.source_columns));
                        if backs && !replaced {
                            return Err(EngineError::InUse {
                                object: name.clone(),
                                constraint: fk.name.clone(),
                            });
                        }
                    }
                }

                if index.unique {
                    let mut remaining = snapshot.clone();
                    remaining.indexes.retain(|i| &i.name != name);
                    let referencing = self.foreign_keys().find(|fk| {
                        &fk.ref_table == table
                            && index.matches_columns(&fk.ref_columns)
                            && !remaining.is_referenceable(&fk.ref_columns)
                    });
                    if let Some(fk) = referencing {
                        return Err(EngineError::InUse {
                            object: name.clone(),
                            constraint: fk.name.clone(),
                        });
                    }
                }

                let snapshot = self.table_mut(table)?;
                snapshot.indexes.retain(|i| &i.name != name);
            }
            DdlOperation::CreateIndex { table, name, columns, unique } => {
                self.require_columns(table, columns)?;
                let snapshot = self.table_mut(table)?;
                if snapshot.index(name).is_some() {
                    return Err(EngineError::DuplicateObject(name.clone()));
                }
                snapshot.indexes.push(Index {
                    name: name.clone(),
                    table: table.clone(),
                    columns: columns.clone(),
                    unique: *unique,
                });
            }
            DdlOperation::AddForeignKey(fk) => {
                self.require_columns(&fk.source_table, &fk.source_columns)?;
                self.require_columns(&fk.ref_table, &fk.ref_columns)?;
                if !self.table(&fk.ref_table)?.is_referenceable(&fk.ref_columns) {
                    return Err(EngineError::NotReferenceable {
                        table: fk.ref_table.clone(),
                        columns: fk.ref_columns.join(", "),
                    });
                }
                if self.foreign_keys().any(|existing| existing.name == fk.name) {
                    return Err(EngineError::DuplicateObject(fk.name.clone()));
                }

                let snapshot = self.table_mut(&fk.source_table)?;
                snapshot.foreign_keys.push(fk.clone());

                let covered = snapshot
                    .indexes
                    .iter()
                    .any(|i| i.has_leading_columns(&fk.source_columns));
                if indexes_foreign_keys && !covered && snapshot.index(&fk.name).is_none() {
                    snapshot.indexes.push(Index {
                        name: fk.name.clone(),
                        table: fk.source_table.clone(),
                        columns: fk.source_columns.clone(),
                        unique: false,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Shared handle to an in-memory schema. Clones see the same state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    state: Arc<RwLock<MemoryState>>,
    table_prefix: String,
    indexes_foreign_keys: bool,
    refreshes: Arc<AtomicUsize>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Empty schema that indexes foreign keys the way MySQL does
    pub fn new() -> Self {
        Self::with_options("", true)
    }

    pub fn with_options(table_prefix: impl Into<String>, indexes_foreign_keys: bool) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            table_prefix: table_prefix.into(),
            indexes_foreign_keys,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed from existing snapshots without re-checking engine rules
    pub fn from_snapshots(
        table_prefix: impl Into<String>,
        indexes_foreign_keys: bool,
        snapshots: impl IntoIterator<Item = TableSnapshot>,
    ) -> Self {
        let tables = snapshots.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            state: Arc::new(RwLock::new(MemoryState { tables })),
            table_prefix: table_prefix.into(),
            indexes_foreign_keys,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn create_table(&self, name: &str, columns: Vec<Column>, primary_key: Vec<String>) -> ResolverResult<()> {
        let mut state = self.state.write().await;
        if state.tables.contains_key(name) {
            return Err(ResolverError::ddl(
                name,
                format!("Create table {}", name),
                EngineError::DuplicateTable(name.to_string()),
            ));
        }
        state.tables.insert(
            name.to_string(),
            TableSnapshot::new(name, columns).with_unique_key(primary_key),
        );
        Ok(())
    }

    /// Independent copy of the current schema
    pub async fn fork(&self) -> Self {
        let state = self.state.read().await;
        Self::from_snapshots(
            self.table_prefix.clone(),
            self.indexes_foreign_keys,
            state.tables.values().cloned().collect::<Vec<_>>(),
        )
    }

    pub async fn snapshots(&self) -> Vec<TableSnapshot> {
        self.state.read().await.tables.values().cloned().collect()
    }

    /// Number of refresh calls observed
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl SchemaInspector for MemoryDatabase {
    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn indexes_foreign_keys(&self) -> bool {
        self.indexes_foreign_keys
    }

    async fn table_names(&self) -> ResolverResult<Vec<String>> {
        Ok(self.state.read().await.tables.keys().cloned().collect())
    }

    async fn table_schema(&self, name: &str) -> ResolverResult<Option<TableSnapshot>> {
        Ok(self.state.read().await.tables.get(name).cloned())
    }

    async fn refresh(&self) -> ResolverResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_table(&self, _name: &str) -> ResolverResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl DdlSink for MemoryDatabase {
    fn mode(&self) -> SinkMode {
        SinkMode::Immediate
    }

    async fn execute(&self, operation: &DdlOperation) -> ResolverResult<()> {
        debug!("memory: {}", operation.description());
        let mut state = self.state.write().await;
        state
            .apply(operation, self.indexes_foreign_keys)
            .map_err(|e| ResolverError::ddl(operation.table(), operation.description(), e))
    }
}
