//! Column rename
//!
//! Engines refuse to rename a column under any constraint on its table, so
//! every key and index on the table comes off, along with every key in
//! other tables that references it. Own keys go first, then incoming keys,
//! then indexes: a unique index cannot be dropped while an incoming key
//! still depends on it. For the same reason such an index is restored ahead
//! of the incoming keys.

use super::DependencyResolver;
use crate::ddl::{DdlOperation, DdlSink};
use crate::error::{inconsistency, not_found, ResolverResult};
use crate::inspector::SchemaInspector;
use crate::models::{ForeignKeyConstraint, Index};
use tracing::{debug, info};

impl<'a, I: SchemaInspector, S: DdlSink> DependencyResolver<'a, I, S> {
    pub async fn rename_column(&self, table: &str, old_name: &str, new_name: &str) -> ResolverResult<()> {
        let table = self.inspector.raw_table_name(table);

        let catalog = self.catalog().await?;
        let snapshot = catalog
            .table(&table)
            .ok_or_else(|| not_found(format!("Table '{}' does not exist", table)))?;
        if !snapshot.has_column(old_name) {
            return Err(not_found(format!("Column '{}' does not exist in '{}'", old_name, table)));
        }
        if old_name == new_name {
            debug!("Column {}.{} already has that name", table, old_name);
            return Ok(());
        }
        if snapshot.has_column(new_name) {
            return Err(inconsistency(format!(
                "Cannot rename '{}.{}': column '{}' already exists",
                table, old_name, new_name
            )));
        }

        info!("Renaming column {}.{} to {}", table, old_name, new_name);

        let mut own_fks = self.drop_all_foreign_keys_on_table(&table).await?;
        let mut incoming = self.drop_all_foreign_keys_to_table(&table).await?;
        let mut indexes = self.drop_all_indexes_on_table(&table).await?;

        self.emit(DdlOperation::RenameColumn {
            table: table.clone(),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        })
        .await?;

        substitute_column(&mut own_fks, &mut incoming, &mut indexes, old_name, new_name);

        self.restore_referenced_indexes(&indexes, &incoming).await?;
        for fk in &incoming {
            self.restore_foreign_key(fk).await?;
        }
        self.restore_captured_indexes(&indexes).await?;
        self.restore_captured_foreign_keys(&own_fks).await?;
        self.restore_backing_indexes(&indexes).await?;

        self.inspector.refresh_table(&table).await?;
        info!("Renamed column {}.{} to {}", table, old_name, new_name);
        Ok(())
    }
}

fn substitute_column(
    own_fks: &mut [ForeignKeyConstraint],
    incoming: &mut [ForeignKeyConstraint],
    indexes: &mut [Index],
    old_name: &str,
    new_name: &str,
) {
    for fk in own_fks.iter_mut() {
        fk.rename_source_column(old_name, new_name);
        if fk.is_self_referencing() {
            fk.rename_ref_column(old_name, new_name);
        }
    }
    for fk in incoming.iter_mut() {
        fk.rename_ref_column(old_name, new_name);
    }
    for index in indexes.iter_mut() {
        index.rename_column(old_name, new_name);
    }
}
