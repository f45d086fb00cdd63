//! Table rename
//!
//! Incoming keys are dropped before the table's own keys, own keys before
//! own indexes (an index backing a key cannot go while the key exists).
//! Self-referencing keys are captured once, as own keys, and restored once.
//! Unique indexes that incoming keys reference come back before those keys.

use super::DependencyResolver;
use crate::ddl::{DdlOperation, DdlSink};
use crate::error::{inconsistency, not_found, ResolverResult};
use crate::inspector::SchemaInspector;
use crate::models::{ForeignKeyConstraint, Index};
use tracing::{debug, info};

impl<'a, I: SchemaInspector, S: DdlSink> DependencyResolver<'a, I, S> {
    /// Rename `old_name` to `new_name`, carrying over every key and index
    /// that involves it. Keys and indexes come back under names derived from
    /// the new table name.
    pub async fn rename_table(&self, old_name: &str, new_name: &str) -> ResolverResult<()> {
        let old = self.inspector.raw_table_name(old_name);
        let new = self.inspector.raw_table_name(new_name);

        let catalog = self.catalog().await?;
        if catalog.table(&old).is_none() {
            return Err(not_found(format!("Table '{}' does not exist", old)));
        }
        if old == new {
            debug!("Table {} already has that name", old);
            return Ok(());
        }
        if catalog.table(&new).is_some() {
            return Err(inconsistency(format!(
                "Cannot rename '{}': table '{}' already exists",
                old, new
            )));
        }

        info!("Renaming table {} to {}", old, new);

        let mut incoming = self.drop_all_foreign_keys_to_table(&old).await?;
        let mut own_fks = self.drop_all_foreign_keys_on_table(&old).await?;
        let mut own_indexes = self.drop_all_indexes_on_table(&old).await?;
        debug!(
            "Captured {} incoming keys, {} own keys, {} indexes",
            incoming.len(),
            own_fks.len(),
            own_indexes.len()
        );

        self.emit(DdlOperation::RenameTable {
            old_name: old.clone(),
            new_name: new.clone(),
        })
        .await?;

        substitute_table(&mut incoming, &mut own_fks, &mut own_indexes, &old, &new);

        self.restore_referenced_indexes(&own_indexes, &incoming).await?;
        for fk in incoming.iter().filter(|fk| !fk.is_self_referencing()) {
            self.restore_foreign_key(fk).await?;
        }
        self.restore_captured_indexes(&own_indexes).await?;
        for fk in &own_fks {
            self.restore_foreign_key(fk).await?;
        }
        self.restore_backing_indexes(&own_indexes).await?;

        self.inspector.refresh_table(&new).await?;
        info!("Renamed table {} to {}", old, new);
        Ok(())
    }
}

/// Source tables first, then referenced tables. Already-renamed entries are
/// left untouched, so overlapping captures in a cycle never double-apply.
fn substitute_table(
    incoming: &mut [ForeignKeyConstraint],
    own_fks: &mut [ForeignKeyConstraint],
    own_indexes: &mut [Index],
    old: &str,
    new: &str,
) {
    for fk in incoming.iter_mut().chain(own_fks.iter_mut()) {
        fk.rename_source_table(old, new);
    }
    for fk in incoming.iter_mut().chain(own_fks.iter_mut()) {
        fk.rename_ref_table(old, new);
    }
    for index in own_indexes.iter_mut().filter(|i| i.table == old) {
        index.table = new.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::ScriptSink;
    use crate::error::ResolverError;
    use crate::fixtures::{
        add_foreign_key, columns, content_schema, foreign_key_shapes, index_shapes, rename_in_index_shapes,
        rename_in_shapes, table, unindexed_content_schema,
    };
    use crate::inspector::MemoryDatabase;
    use crate::models::ReferentialAction;
    use crate::naming::NamingScheme;
    use pretty_assertions::assert_eq;
    use tokio_test::assert_err;

    async fn assert_round_trip(db: MemoryDatabase) {
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());
        let fks_before = foreign_key_shapes(&db).await;
        let indexes_before = index_shapes(&db).await;

        resolver.rename_table("categories", "sections").await.unwrap();
        assert_eq!(
            foreign_key_shapes(&db).await,
            rename_in_shapes(&fks_before, "categories", "sections")
        );
        assert_eq!(
            index_shapes(&db).await,
            rename_in_index_shapes(&indexes_before, "categories", "sections")
        );

        resolver.rename_table("sections", "categories").await.unwrap();
        assert_eq!(foreign_key_shapes(&db).await, fks_before);
        assert_eq!(index_shapes(&db).await, indexes_before);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_keys_and_indexes() {
        assert_round_trip(content_schema().await).await;
    }

    #[tokio::test]
    async fn test_round_trip_without_implicit_key_indexes() {
        assert_round_trip(unindexed_content_schema().await).await;
    }

    #[tokio::test]
    async fn test_restored_names_are_derived_from_new_table() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        resolver.rename_table("categories", "sections").await.unwrap();

        let sections = db.table_schema("sections").await.unwrap().unwrap();
        let mut fk_names: Vec<_> = sections.foreign_keys.iter().map(|fk| fk.name.as_str()).collect();
        fk_names.sort();
        assert_eq!(
            fk_names,
            vec!["sections_groupId_fk", "sections_parentId_fk", "sections_structureId_fk"]
        );

        let mut index_names: Vec<_> = sections.indexes.iter().map(|i| i.name.as_str()).collect();
        index_names.sort();
        assert_eq!(
            index_names,
            vec![
                "sections_groupId_slug_unq_idx",
                "sections_parentId_fk",
                "sections_slug_idx",
                "sections_structureId_fk",
            ]
        );

        let entries = db.table_schema("entries").await.unwrap().unwrap();
        let incoming = entries
            .foreign_keys
            .iter()
            .find(|fk| fk.source_columns == columns(&["categoryId"]))
            .unwrap();
        assert_eq!(incoming.ref_table, "sections");
        assert_eq!(incoming.on_delete, ReferentialAction::Cascade);
    }

    #[tokio::test]
    async fn test_self_reference_restored_exactly_once() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        resolver.rename_table("categories", "sections").await.unwrap();

        let self_refs: Vec<_> = db
            .table_schema("sections")
            .await
            .unwrap()
            .unwrap()
            .foreign_keys
            .into_iter()
            .filter(|fk| fk.is_self_referencing())
            .collect();
        assert_eq!(self_refs.len(), 1);
        assert_eq!(self_refs[0].ref_table, "sections");
        assert_eq!(self_refs[0].source_columns, columns(&["parentId"]));
        assert_eq!(self_refs[0].ref_columns, columns(&["id"]));
        assert_eq!(self_refs[0].on_delete, ReferentialAction::SetNull);
    }

    #[tokio::test]
    async fn test_every_member_of_a_cycle_can_be_renamed() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());
        let mut expected_fks = foreign_key_shapes(&db).await;
        let mut expected_indexes = index_shapes(&db).await;

        for (old, new) in [("structures", "layouts"), ("entries", "posts"), ("categories", "sections")] {
            resolver.rename_table(old, new).await.unwrap();
            expected_fks = rename_in_shapes(&expected_fks, old, new);
            expected_indexes = rename_in_index_shapes(&expected_indexes, old, new);

            assert_eq!(foreign_key_shapes(&db).await, expected_fks);
            assert_eq!(index_shapes(&db).await, expected_indexes);
        }
    }

    #[tokio::test]
    async fn test_two_table_cycle() {
        let db = MemoryDatabase::new();
        table(&db, "a", &["id", "bId"]).await;
        table(&db, "b", &["id", "aId"]).await;
        add_foreign_key(&db, "a", &["bId"], "b", &["id"], ReferentialAction::Cascade).await;
        add_foreign_key(&db, "b", &["aId"], "a", &["id"], ReferentialAction::Restrict).await;
        let before = foreign_key_shapes(&db).await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        resolver.rename_table("a", "z").await.unwrap();

        assert_eq!(foreign_key_shapes(&db).await, rename_in_shapes(&before, "a", "z"));
    }

    #[tokio::test]
    async fn test_composite_key_order_survives() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        resolver.rename_table("element_sites", "sites").await.unwrap();

        let relations = db.table_schema("relations").await.unwrap().unwrap();
        assert_eq!(relations.foreign_keys.len(), 1);
        let fk = &relations.foreign_keys[0];
        assert_eq!(fk.ref_table, "sites");
        assert_eq!(fk.source_columns, columns(&["sourceId", "sourceSiteId"]));
        assert_eq!(fk.ref_columns, columns(&["elementId", "siteId"]));
        assert!(db
            .table_schema("sites")
            .await
            .unwrap()
            .unwrap()
            .index("sites_elementId_siteId_unq_idx")
            .is_some());
    }

    #[tokio::test]
    async fn test_referenced_unique_index_restored_before_incoming_key() {
        let db = unindexed_content_schema().await;
        let sink = ScriptSink::project(&db, "rename_sites", "public").await.unwrap();
        let resolver = DependencyResolver::new(&sink, &sink, NamingScheme::default());

        resolver.rename_table("element_sites", "sites").await.unwrap();

        let operations = sink.operations().await;
        let unique_index = operations
            .iter()
            .position(|op| matches!(op, DdlOperation::CreateIndex { name, .. } if name == "sites_elementId_siteId_unq_idx"))
            .unwrap();
        let incoming = operations
            .iter()
            .position(|op| matches!(op, DdlOperation::AddForeignKey(fk) if fk.source_table == "relations"))
            .unwrap();
        assert!(unique_index < incoming);

        let created = operations
            .iter()
            .filter(|op| matches!(op, DdlOperation::CreateIndex { .. }))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        let err = assert_err!(resolver.rename_table("widgets", "gadgets").await);
        assert!(matches!(err, ResolverError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_existing_target_is_rejected_before_any_ddl() {
        let db = content_schema().await;
        let sink = ScriptSink::project(&db, "collision", "public").await.unwrap();
        let resolver = DependencyResolver::new(&sink, &sink, NamingScheme::default());

        let err = assert_err!(resolver.rename_table("categories", "entries").await);
        assert!(matches!(err, ResolverError::SchemaInconsistency(_)));
        assert!(sink.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_to_same_name_emits_nothing() {
        let db = content_schema().await;
        let sink = ScriptSink::project(&db, "noop", "public").await.unwrap();
        let resolver = DependencyResolver::new(&sink, &sink, NamingScheme::default());

        resolver.rename_table("categories", "{{categories}}").await.unwrap();
        assert!(sink.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_refreshes_after_rename() {
        let db = content_schema().await;
        let resolver = DependencyResolver::new(&db, &db, NamingScheme::default());

        resolver.rename_table("users", "authors").await.unwrap();
        assert_eq!(db.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_script_replay_matches_immediate_run() {
        let db = content_schema().await;

        let immediate = db.fork().await;
        DependencyResolver::new(&immediate, &immediate, NamingScheme::default())
            .rename_table("categories", "sections")
            .await
            .unwrap();

        let sink = ScriptSink::project(&db, "rename_categories", "public").await.unwrap();
        DependencyResolver::new(&sink, &sink, NamingScheme::default())
            .rename_table("categories", "sections")
            .await
            .unwrap();
        let script = sink.finish().unwrap();

        assert!(db.table_schema("categories").await.unwrap().is_some());

        let replayed = db.fork().await;
        script.replay(&replayed).await.unwrap();
        assert_eq!(replayed.snapshots().await, immediate.snapshots().await);
    }
}
