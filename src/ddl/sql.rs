//! PostgreSQL DDL rendering
//!
//! Generates one statement per [`DdlOperation`], schema-qualified and with
//! every identifier quoted.

use super::DdlOperation;

/// Quote an identifier (table/column name) safely
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

fn column_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

impl DdlOperation {
    /// Render the statement against `schema`, without a trailing semicolon
    pub fn to_sql(&self, schema: &str) -> String {
        match self {
            DdlOperation::RenameTable { old_name, new_name } => format!(
                "ALTER TABLE {} RENAME TO {}",
                qualified(schema, old_name),
                quote_ident(new_name)
            ),
            DdlOperation::RenameColumn { table, old_name, new_name } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                qualified(schema, table),
                quote_ident(old_name),
                quote_ident(new_name)
            ),
            DdlOperation::DropTable { table } => format!("DROP TABLE {}", qualified(schema, table)),
            DdlOperation::DropForeignKey { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                qualified(schema, table),
                quote_ident(name)
            ),
            DdlOperation::DropIndex { name, .. } => format!("DROP INDEX {}", qualified(schema, name)),
            DdlOperation::CreateIndex { table, name, columns, unique } => format!(
                "CREATE {}INDEX {} ON {} ({})",
                if *unique { "UNIQUE " } else { "" },
                quote_ident(name),
                qualified(schema, table),
                column_list(columns)
            ),
            DdlOperation::AddForeignKey(fk) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                qualified(schema, &fk.source_table),
                quote_ident(&fk.name),
                column_list(&fk.source_columns),
                qualified(schema, &fk.ref_table),
                column_list(&fk.ref_columns),
                fk.on_delete,
                fk.on_update
            ),
        }
    }
}
