//! Shared test fixtures: an in-memory content schema and shape helpers.

use crate::ddl::{DdlOperation, DdlSink};
use crate::inspector::{MemoryDatabase, SchemaInspector};
use crate::models::{Column, ForeignKeyConstraint, ForeignKeyShape, ReferentialAction};
use crate::naming::NamingScheme;
use std::collections::BTreeSet;

pub(crate) fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub(crate) async fn table(db: &MemoryDatabase, name: &str, column_names: &[&str]) {
    let cols = column_names
        .iter()
        .map(|c| Column::new(*c, "integer", *c != "id"))
        .collect();
    let primary_key = if column_names.contains(&"id") { columns(&["id"]) } else { Vec::new() };
    db.create_table(name, cols, primary_key).await.unwrap();
}

pub(crate) fn foreign_key(
    source: &str,
    source_columns: &[&str],
    ref_table: &str,
    ref_columns: &[&str],
    on_delete: ReferentialAction,
) -> ForeignKeyConstraint {
    ForeignKeyConstraint::new(
        NamingScheme::default().foreign_key_name(source, source_columns),
        source,
        columns(source_columns),
        ref_table,
        columns(ref_columns),
        ReferentialAction::NoAction,
        on_delete,
    )
    .unwrap()
}

pub(crate) async fn add_foreign_key(
    db: &MemoryDatabase,
    source: &str,
    source_columns: &[&str],
    ref_table: &str,
    ref_columns: &[&str],
    on_delete: ReferentialAction,
) {
    let fk = foreign_key(source, source_columns, ref_table, ref_columns, on_delete);
    db.execute(&DdlOperation::AddForeignKey(fk)).await.unwrap();
}

pub(crate) async fn add_index(db: &MemoryDatabase, table: &str, index_columns: &[&str], unique: bool) {
    let name = NamingScheme::default().index_name(table, index_columns, unique, false);
    db.execute(&DdlOperation::CreateIndex {
        table: table.to_string(),
        name,
        columns: columns(index_columns),
        unique,
    })
    .await
    .unwrap();
}

/// Content schema with a self reference, a composite key and a three-table
/// cycle through `categories`:
///
/// ```text
/// categories.groupId      -> groups.id            CASCADE
/// categories.parentId     -> categories.id        SET NULL
/// categories.structureId  -> structures.id        SET NULL
/// structures.rootEntryId  -> entries.id           SET NULL
/// entries.categoryId      -> categories.id        CASCADE
/// entries.authorId        -> users.id             SET NULL
/// relations.(sourceId, sourceSiteId) -> element_sites.(elementId, siteId)  CASCADE
/// ```
pub(crate) async fn content_schema() -> MemoryDatabase {
    seed_content_schema(MemoryDatabase::new()).await
}

/// The content schema on an engine that leaves foreign keys unindexed
pub(crate) async fn unindexed_content_schema() -> MemoryDatabase {
    seed_content_schema(MemoryDatabase::with_options("", false)).await
}

async fn seed_content_schema(db: MemoryDatabase) -> MemoryDatabase {
    table(&db, "groups", &["id", "name"]).await;
    table(&db, "users", &["id", "email"]).await;
    table(&db, "structures", &["id", "rootEntryId"]).await;
    table(&db, "categories", &["id", "groupId", "parentId", "structureId", "slug"]).await;
    table(&db, "entries", &["id", "categoryId", "authorId", "slug"]).await;
    table(&db, "element_sites", &["elementId", "siteId", "uri"]).await;
    table(&db, "relations", &["id", "sourceId", "sourceSiteId", "targetId"]).await;

    add_index(&db, "categories", &["groupId", "slug"], true).await;
    add_index(&db, "categories", &["slug"], false).await;
    add_index(&db, "entries", &["slug"], false).await;
    add_index(&db, "element_sites", &["elementId", "siteId"], true).await;

    add_foreign_key(&db, "categories", &["groupId"], "groups", &["id"], ReferentialAction::Cascade).await;
    add_foreign_key(&db, "categories", &["parentId"], "categories", &["id"], ReferentialAction::SetNull).await;
    add_foreign_key(&db, "categories", &["structureId"], "structures", &["id"], ReferentialAction::SetNull).await;
    add_foreign_key(&db, "structures", &["rootEntryId"], "entries", &["id"], ReferentialAction::SetNull).await;
    add_foreign_key(&db, "entries", &["categoryId"], "categories", &["id"], ReferentialAction::Cascade).await;
    add_foreign_key(&db, "entries", &["authorId"], "users", &["id"], ReferentialAction::SetNull).await;
    add_foreign_key(
        &db,
        "relations",
        &["sourceId", "sourceSiteId"],
        "element_sites",
        &["elementId", "siteId"],
        ReferentialAction::Cascade,
    )
    .await;

    db
}

/// Every foreign key in the schema, names stripped
pub(crate) async fn foreign_key_shapes<I: SchemaInspector>(db: &I) -> BTreeSet<ForeignKeyShape> {
    let mut shapes = BTreeSet::new();
    for name in db.table_names().await.unwrap() {
        let snapshot = db.table_schema(&name).await.unwrap().unwrap();
        shapes.extend(snapshot.foreign_keys.iter().map(|fk| fk.shape()));
    }
    shapes
}

/// `(table, columns, unique)` for every index in the schema
pub(crate) async fn index_shapes<I: SchemaInspector>(db: &I) -> BTreeSet<(String, Vec<String>, bool)> {
    let mut shapes = BTreeSet::new();
    for name in db.table_names().await.unwrap() {
        let snapshot = db.table_schema(&name).await.unwrap().unwrap();
        shapes.extend(
            snapshot
                .indexes
                .iter()
                .map(|i| (i.table.clone(), i.columns.clone(), i.unique)),
        );
    }
    shapes
}

/// Apply a table substitution to a set of index shapes
pub(crate) fn rename_in_index_shapes(
    shapes: &BTreeSet<(String, Vec<String>, bool)>,
    old: &str,
    new: &str,
) -> BTreeSet<(String, Vec<String>, bool)> {
    shapes
        .iter()
        .map(|(table, cols, unique)| {
            let table = if table == old { new.to_string() } else { table.clone() };
            (table, cols.clone(), *unique)
        })
        .collect()
}

/// Apply a table substitution to a set of foreign key shapes
pub(crate) fn rename_in_shapes(shapes: &BTreeSet<ForeignKeyShape>, old: &str, new: &str) -> BTreeSet<ForeignKeyShape> {
    let swap = |t: &String| if t == old { new.to_string() } else { t.clone() };
    shapes
        .iter()
        .map(|(source, cols, target, ref_cols, on_update, on_delete)| {
            (swap(source), cols.clone(), swap(target), ref_cols.clone(), *on_update, *on_delete)
        })
        .collect()
}
