//! PostgreSQL inspector and sink
//!
//! Reads `pg_catalog` inside the caller's transaction and executes DDL on
//! the same transaction, so every statement the resolver issues commits or
//! rolls back together. Snapshots are cached per table and the cache is
//! cleared after every executed statement.

use super::SchemaInspector;
use crate::ddl::{DdlOperation, DdlSink, SinkMode};
use crate::error::{ResolverError, ResolverResult};
use crate::models::{Column, ForeignKeyConstraint, Index, ReferentialAction, TableSnapshot};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_postgres::Transaction;
use tracing::{debug, warn};

const TABLES_QUERY: &str = r#"
    SELECT c.relname::text
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
    ORDER BY c.relname
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT a.attname::text,
           pg_catalog.format_type(a.atttypid, a.atttypmod),
           NOT a.attnotnull
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
      AND a.attnum > 0 AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// Primary key and unique constraints, the keys foreign keys may target
/// besides plain unique indexes
const UNIQUE_KEYS_QUERY: &str = r#"
    SELECT array_agg(att.attname::text ORDER BY k.ord)
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class cls ON cls.oid = con.conrelid
    JOIN pg_catalog.pg_namespace ns ON ns.oid = cls.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
    WHERE con.contype IN ('p', 'u') AND ns.nspname = $1 AND cls.relname = $2
    GROUP BY con.oid, con.conname
    ORDER BY con.conname
"#;

/// Composite keys keep their declared column order through `WITH ORDINALITY`
const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT con.conname::text,
           ref_class.relname::text,
           array_agg(src_att.attname::text ORDER BY k.ord),
           array_agg(ref_att.attname::text ORDER BY k.ord),
           con.confupdtype::text,
           con.confdeltype::text
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class cls ON cls.oid = con.conrelid
    JOIN pg_catalog.pg_namespace ns ON ns.oid = cls.relnamespace
    JOIN pg_catalog.pg_class ref_class ON ref_class.oid = con.confrelid
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(src_attnum, ref_attnum, ord)
    JOIN pg_catalog.pg_attribute src_att ON src_att.attrelid = con.conrelid AND src_att.attnum = k.src_attnum
    JOIN pg_catalog.pg_attribute ref_att ON ref_att.attrelid = con.confrelid AND ref_att.attnum = k.ref_attnum
    WHERE con.contype = 'f' AND ns.nspname = $1 AND cls.relname = $2
    GROUP BY con.conname, ref_class.relname, con.confupdtype, con.confdeltype
    ORDER BY con.conname
"#;

/// Plain column indexes only: primary keys, constraint-owned indexes and
/// expression indexes are not the resolver's to drop
const INDEXES_QUERY: &str = r#"
    SELECT idx.relname::text,
           ix.indisunique,
           array_agg(att.attname::text ORDER BY k.ord)
    FROM pg_catalog.pg_index ix
    JOIN pg_catalog.pg_class tbl ON tbl.oid = ix.indrelid
    JOIN pg_catalog.pg_namespace ns ON ns.oid = tbl.relnamespace
    JOIN pg_catalog.pg_class idx ON idx.oid = ix.indexrelid
    CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute att ON att.attrelid = tbl.oid AND att.attnum = k.attnum
    WHERE ns.nspname = $1 AND tbl.relname = $2
      AND NOT ix.indisprimary
      AND ix.indexprs IS NULL
      AND NOT EXISTS (
          SELECT 1 FROM pg_catalog.pg_constraint c
          WHERE c.conindid = ix.indexrelid AND c.conrelid = ix.indrelid
            AND c.contype IN ('p', 'u', 'x')
      )
    GROUP BY idx.relname, ix.indisunique
    ORDER BY idx.relname
"#;

/// Inspector and immediate sink over one open transaction
pub struct PgSession<'t, 'c> {
    tx: &'t Transaction<'c>,
    schema: String,
    table_prefix: String,
    cache: RwLock<HashMap<String, TableSnapshot>>,
}

impl<'t, 'c> PgSession<'t, 'c> {
    pub fn new(tx: &'t Transaction<'c>, schema: impl Into<String>, table_prefix: impl Into<String>) -> Self {
        Self {
            tx,
            schema: schema.into(),
            table_prefix: table_prefix.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn load_table(&self, name: &str) -> ResolverResult<Option<TableSnapshot>> {
        let column_rows = self.tx.query(COLUMNS_QUERY, &[&self.schema, &name]).await?;
        if column_rows.is_empty() {
            return Ok(None);
        }
        let columns = column_rows
            .iter()
            .map(|row| Column::new(row.get::<_, String>(0), row.get::<_, String>(1), row.get::<_, bool>(2)))
            .collect();
        let mut snapshot = TableSnapshot::new(name, columns);
        for row in self.tx.query(UNIQUE_KEYS_QUERY, &[&self.schema, &name]).await? {
            snapshot = snapshot.with_unique_key(row.get(0));
        }

        for row in self.tx.query(FOREIGN_KEYS_QUERY, &[&self.schema, &name]).await? {
            let constraint: String = row.get(0);
            let on_update = parse_action(&constraint, &row.get::<_, String>(4));
            let on_delete = parse_action(&constraint, &row.get::<_, String>(5));
            snapshot.foreign_keys.push(ForeignKeyConstraint::new(
                constraint,
                name,
                row.get(2),
                row.get::<_, String>(1),
                row.get(3),
                on_update,
                on_delete,
            )?);
        }

        for row in self.tx.query(INDEXES_QUERY, &[&self.schema, &name]).await? {
            snapshot.indexes.push(Index {
                name: row.get(0),
                table: name.to_string(),
                unique: row.get(1),
                columns: row.get(2),
            });
        }

        debug!(
            "Loaded {}.{}: {} columns, {} foreign keys, {} indexes",
            self.schema,
            name,
            snapshot.columns.len(),
            snapshot.foreign_keys.len(),
            snapshot.indexes.len()
        );
        Ok(Some(snapshot))
    }
}

fn parse_action(constraint: &str, code: &str) -> ReferentialAction {
    ReferentialAction::from_pg_code(code).unwrap_or_else(|| {
        warn!("Unknown referential action '{}' on {}, assuming NO ACTION", code, constraint);
        ReferentialAction::NoAction
    })
}

impl SchemaInspector for PgSession<'_, '_> {
    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    async fn table_names(&self) -> ResolverResult<Vec<String>> {
        let rows = self.tx.query(TABLES_QUERY, &[&self.schema]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_schema(&self, name: &str) -> ResolverResult<Option<TableSnapshot>> {
        if let Some(snapshot) = self.cache.read().await.get(name) {
            return Ok(Some(snapshot.clone()));
        }
        let snapshot = self.load_table(name).await?;
        if let Some(snapshot) = &snapshot {
            self.cache.write().await.insert(name.to_string(), snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn refresh(&self) -> ResolverResult<()> {
        self.cache.write().await.clear();
        Ok(())
    }

    async fn refresh_table(&self, name: &str) -> ResolverResult<()> {
        self.cache.write().await.remove(name);
        Ok(())
    }
}

impl DdlSink for PgSession<'_, '_> {
    fn mode(&self) -> SinkMode {
        SinkMode::Immediate
    }

    async fn execute(&self, operation: &DdlOperation) -> ResolverResult<()> {
        let sql = operation.to_sql(&self.schema);
        debug!("Executing: {}", sql);

        let result = self.tx.batch_execute(&sql).await;
        // Any statement may change names or membership in other tables
        self.cache.write().await.clear();
        result.map_err(|e| ResolverError::ddl(operation.table(), operation.description(), e))
    }
}
