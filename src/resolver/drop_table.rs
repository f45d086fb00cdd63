//! Table drop: destructive, nothing is restored.

use super::DependencyResolver;
use crate::ddl::{DdlOperation, DdlSink};
use crate::error::{not_found, ResolverResult};
use crate::inspector::SchemaInspector;
use tracing::{info, warn};

impl<'a, I: SchemaInspector, S: DdlSink> DependencyResolver<'a, I, S> {
    pub async fn drop_table(&self, table: &str) -> ResolverResult<()> {
        let table = self.inspector.raw_table_name(table);
        if self.catalog().await?.table(&table).is_none() {
            return Err(not_found(format!("Table '{}' does not exist", table)));
        }

        info!("Dropping table {}", table);
        self.drop_all_foreign_keys_on_table(&table).await?;
        let severed = self.drop_all_foreign_keys_to_table(&table).await?;
        for fk in &severed {
            warn!(
                "Foreign key {}({}) loses its target {}",
                fk.source_table,
                fk.source_columns.join(", "),
                table
            );
        }

        self.emit(DdlOperation::DropTable { table: table.clone() }).await?;
        self.inspector.refresh().await?;
        Ok(())
    }
}
