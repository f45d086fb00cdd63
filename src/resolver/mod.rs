//! Dependency resolver
//!
//! Renames and drops tables and columns while keeping every foreign key and
//! index that depends on them. Engines refuse to rename an object that a
//! name-bound constraint still points at, so each mutation runs a
//! capture/restore cycle: drop the dependents, mutate, then recreate the
//! dependents against the new identifier with freshly derived names.
//!
//! The resolver is written once against [`SchemaInspector`] and [`DdlSink`];
//! whether DDL runs immediately or lands in a migration script depends only
//! on the sink.

mod drop_table;
mod plan;
mod rename_column;
mod rename_table;

pub use plan::{
    DropTableMutation, MigrationPlan, RenameColumnMutation, RenameTableMutation, SchemaMutation,
};

use crate::catalog::{ConstraintCatalog, ForeignKeysBySource, DEFAULT_REFERENCE_COLUMN};
use crate::ddl::{DdlOperation, DdlSink};
use crate::error::{inconsistency, not_found, ResolverResult};
use crate::inspector::SchemaInspector;
use crate::models::{ForeignKeyConstraint, Index};
use crate::naming::NamingScheme;
use tracing::{debug, info};

pub struct DependencyResolver<'a, I, S> {
    inspector: &'a I,
    sink: &'a S,
    naming: NamingScheme,
}

impl<'a, I: SchemaInspector, S: DdlSink> DependencyResolver<'a, I, S> {
    pub fn new(inspector: &'a I, sink: &'a S, naming: NamingScheme) -> Self {
        Self {
            inspector,
            sink,
            naming,
        }
    }

    /// Fresh catalog; never reuse one across DDL
    async fn catalog(&self) -> ResolverResult<ConstraintCatalog> {
        ConstraintCatalog::load(self.inspector, self.naming).await
    }

    async fn emit(&self, operation: DdlOperation) -> ResolverResult<()> {
        debug!(mode = ?self.sink.mode(), "{}", operation.description());
        self.sink.execute(&operation).await
    }

    /// Run one plan entry
    pub async fn apply(&self, mutation: &SchemaMutation) -> ResolverResult<()> {
        info!("Applying mutation: {}", mutation.description());
        match mutation {
            SchemaMutation::RenameTable(m) => self.rename_table(&m.old_name, &m.new_name).await,
            SchemaMutation::RenameColumn(m) => {
                self.rename_column(&m.table, &m.old_name, &m.new_name).await
            }
            SchemaMutation::DropTable(m) => self.drop_table(&m.table).await,
        }
    }

    // =========================================================================
    // Probes
    // =========================================================================

    /// Subset semantics: part of a composite key counts as existing
    pub async fn does_foreign_key_exist(&self, table: &str, columns: &[String]) -> ResolverResult<bool> {
        let table = self.inspector.raw_table_name(table);
        Ok(self.catalog().await?.does_foreign_key_exist(&table, columns))
    }

    pub async fn does_index_exist(
        &self,
        table: &str,
        columns: &[String],
        unique: bool,
        fk_backed: bool,
    ) -> ResolverResult<bool> {
        let table = self.inspector.raw_table_name(table);
        Ok(self
            .catalog()
            .await?
            .does_index_exist(&table, columns, unique, fk_backed))
    }

    /// Keys referencing `table.column` (`id` when no column is given),
    /// grouped by source table
    pub async fn find_foreign_keys_to(&self, table: &str, column: Option<&str>) -> ResolverResult<ForeignKeysBySource> {
        let table = self.inspector.raw_table_name(table);
        let column = column.unwrap_or(DEFAULT_REFERENCE_COLUMN);
        Ok(self.catalog().await?.find_foreign_keys_to(&table, column))
    }

    // =========================================================================
    // Drop primitives
    // =========================================================================

    /// Drop the key guarding `columns` on `table`, by its catalog name
    pub async fn drop_foreign_key(&self, table: &str, columns: &[String]) -> ResolverResult<ForeignKeyConstraint> {
        let table = self.inspector.raw_table_name(table);
        let catalog = self.catalog().await?;
        let fk = catalog.find_foreign_key(&table, columns).cloned().ok_or_else(|| {
            not_found(format!(
                "No foreign key on '{}' covers ({})",
                table,
                columns.join(", ")
            ))
        })?;

        self.emit(DdlOperation::DropForeignKey {
            table: table.clone(),
            name: fk.name.clone(),
        })
        .await?;
        Ok(fk)
    }

    /// Idempotent: a missing key is not an error
    pub async fn drop_foreign_key_if_exists(
        &self,
        table: &str,
        columns: &[String],
    ) -> ResolverResult<Option<ForeignKeyConstraint>> {
        if !self.does_foreign_key_exist(table, columns).await? {
            debug!("No foreign key on {} ({}), nothing to drop", table, columns.join(", "));
            return Ok(None);
        }
        self.drop_foreign_key(table, columns).await.map(Some)
    }

    pub async fn drop_index(&self, table: &str, columns: &[String], unique: bool) -> ResolverResult<String> {
        let table = self.inspector.raw_table_name(table);
        let catalog = self.catalog().await?;
        let name = catalog
            .resolve_index_name(&table, columns, unique)
            .ok_or_else(|| not_found(format!("No index on '{}' over ({})", table, columns.join(", "))))?;

        self.emit(DdlOperation::DropIndex {
            table: table.clone(),
            name: name.clone(),
        })
        .await?;
        Ok(name)
    }

    pub async fn drop_index_if_exists(
        &self,
        table: &str,
        columns: &[String],
        unique: bool,
    ) -> ResolverResult<Option<String>> {
        let raw = self.inspector.raw_table_name(table);
        if self
            .catalog()
            .await?
            .resolve_index_name(&raw, columns, unique)
            .is_none()
        {
            return Ok(None);
        }
        self.drop_index(table, columns, unique).await.map(Some)
    }

    /// Drop every key declared on `table`, returning them for restoration
    pub async fn drop_all_foreign_keys_on_table(&self, table: &str) -> ResolverResult<Vec<ForeignKeyConstraint>> {
        let table = self.inspector.raw_table_name(table);
        let captured = self.catalog().await?.foreign_keys_on(&table).to_vec();
        for fk in &captured {
            self.drop_captured_foreign_key(fk).await?;
        }
        Ok(captured)
    }

    /// Drop every key in other tables that references any column of `table`.
    /// Self-references belong to the table's own keys and are left alone.
    pub async fn drop_all_foreign_keys_to_table(&self, table: &str) -> ResolverResult<Vec<ForeignKeyConstraint>> {
        let table = self.inspector.raw_table_name(table);
        let captured: Vec<ForeignKeyConstraint> = self
            .catalog()
            .await?
            .find_all_foreign_keys_to(&table)
            .into_values()
            .flatten()
            .filter(|fk| !fk.is_self_referencing())
            .collect();
        for fk in &captured {
            self.drop_captured_foreign_key(fk).await?;
        }
        Ok(captured)
    }

    pub async fn drop_all_indexes_on_table(&self, table: &str) -> ResolverResult<Vec<Index>> {
        self.drop_indexes_where(table, |_| true).await
    }

    pub async fn drop_all_unique_indexes_on_table(&self, table: &str) -> ResolverResult<Vec<Index>> {
        self.drop_indexes_where(table, |index| index.unique).await
    }

    async fn drop_indexes_where(&self, table: &str, keep: impl Fn(&Index) -> bool) -> ResolverResult<Vec<Index>> {
        let table = self.inspector.raw_table_name(table);
        let captured: Vec<Index> = self
            .catalog()
            .await?
            .indexes_on(&table)
            .iter()
            .filter(|index| keep(index))
            .cloned()
            .collect();
        for index in &captured {
            self.emit(DdlOperation::DropIndex {
                table: index.table.clone(),
                name: index.name.clone(),
            })
            .await?;
        }
        Ok(captured)
    }

    async fn drop_captured_foreign_key(&self, fk: &ForeignKeyConstraint) -> ResolverResult<()> {
        self.emit(DdlOperation::DropForeignKey {
            table: fk.source_table.clone(),
            name: fk.name.clone(),
        })
        .await
    }

    // =========================================================================
    // Restore primitives
    // =========================================================================

    /// Recreate an index under its derived name
    pub async fn restore_index(&self, table: &str, columns: &[String], unique: bool) -> ResolverResult<String> {
        let table = self.inspector.raw_table_name(table);
        self.create_index(&table, columns, unique, false).await
    }

    async fn create_index(&self, table: &str, columns: &[String], unique: bool, fk_backed: bool) -> ResolverResult<String> {
        let catalog = self.catalog().await?;
        Self::require_columns(&catalog, table, columns)?;

        let name = self.naming.index_name(table, columns, unique, fk_backed);
        self.emit(DdlOperation::CreateIndex {
            table: table.to_string(),
            name: name.clone(),
            columns: columns.to_vec(),
            unique,
        })
        .await?;
        Ok(name)
    }

    /// Recreate a captured key under its derived name, keeping its actions
    pub async fn restore_foreign_key(&self, fk: &ForeignKeyConstraint) -> ResolverResult<ForeignKeyConstraint> {
        let source_table = self.inspector.raw_table_name(&fk.source_table);
        let ref_table = self.inspector.raw_table_name(&fk.ref_table);

        let catalog = self.catalog().await?;
        Self::require_columns(&catalog, &source_table, &fk.source_columns)?;
        Self::require_columns(&catalog, &ref_table, &fk.ref_columns)?;

        let restored = ForeignKeyConstraint::new(
            self.naming.foreign_key_name(&source_table, &fk.source_columns),
            source_table,
            fk.source_columns.clone(),
            ref_table,
            fk.ref_columns.clone(),
            fk.on_update,
            fk.on_delete,
        )?;
        self.emit(DdlOperation::AddForeignKey(restored.clone())).await?;
        Ok(restored)
    }

    fn require_columns(catalog: &ConstraintCatalog, table: &str, columns: &[String]) -> ResolverResult<()> {
        let snapshot = catalog
            .table(table)
            .ok_or_else(|| inconsistency(format!("Table '{}' no longer exists", table)))?;
        match columns.iter().find(|c| !snapshot.has_column(c)) {
            Some(missing) => Err(inconsistency(format!(
                "Column '{}' no longer exists in '{}'",
                missing, table
            ))),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Shared restore steps
    // =========================================================================

    /// Recreate the captured unique indexes that incoming keys reference. A
    /// key cannot be added until its referenced columns are unique again.
    async fn restore_referenced_indexes(
        &self,
        indexes: &[Index],
        incoming: &[ForeignKeyConstraint],
    ) -> ResolverResult<()> {
        let referenced: Vec<Index> = indexes
            .iter()
            .filter(|index| {
                index.unique
                    && incoming
                        .iter()
                        .any(|fk| fk.ref_table == index.table && index.matches_columns(&fk.ref_columns))
            })
            .cloned()
            .collect();
        self.restore_captured_indexes(&referenced).await
    }

    /// Recreate captured indexes that are not FK-backed and not already back
    async fn restore_captured_indexes(&self, indexes: &[Index]) -> ResolverResult<()> {
        for index in indexes {
            if NamingScheme::is_fk_backed(&index.name) {
                continue;
            }
            let catalog = self.catalog().await?;
            if catalog
                .resolve_index_name(&index.table, &index.columns, index.unique)
                .is_some()
            {
                debug!("Index on {} ({}) already present", index.table, index.columns.join(", "));
                continue;
            }
            self.create_index(&index.table, &index.columns, index.unique, false)
                .await?;
        }
        Ok(())
    }

    /// Recreate FK-backed indexes that restoring their keys did not bring back
    async fn restore_backing_indexes(&self, indexes: &[Index]) -> ResolverResult<()> {
        for index in indexes {
            if !NamingScheme::is_fk_backed(&index.name) {
                continue;
            }
            if self.catalog().await?.has_index_over(&index.table, &index.columns) {
                continue;
            }
            self.create_index(&index.table, &index.columns, index.unique, true)
                .await?;
        }
        Ok(())
    }

    /// Restore captured keys unless an identical one already exists
    async fn restore_captured_foreign_keys(&self, fks: &[ForeignKeyConstraint]) -> ResolverResult<()> {
        for fk in fks {
            if self.catalog().await?.has_equivalent_foreign_key(fk) {
                debug!("Foreign key {} ({}) already present", fk.source_table, fk.source_columns.join(", "));
                continue;
            }
            self.restore_foreign_key(fk).await?;
        }
        Ok(())
    }
}
