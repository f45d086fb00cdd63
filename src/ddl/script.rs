//! Migration scripts
//!
//! In script mode nothing touches the database. Operations are applied to an
//! in-memory projection of the live schema, so the resolver's existence
//! checks see earlier script steps, and are recorded in order into a
//! [`MigrationScript`] that can be saved, reviewed and replayed later.

use super::{DdlOperation, DdlSink, SinkMode};
use crate::error::{ResolverError, ResolverResult};
use crate::inspector::{MemoryDatabase, SchemaInspector};
use crate::models::TableSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Ordered, checksummed list of DDL operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationScript {
    pub id: Uuid,
    pub name: String,
    /// `m{yymmdd_HHMMSS}_{name}`
    pub version: String,
    /// Schema the statements render against
    pub schema: String,
    pub created_at: DateTime<Utc>,
    pub operations: Vec<DdlOperation>,
    /// SHA-256 of the serialized operations, set by [`MigrationScript::seal`]
    #[serde(default)]
    pub checksum: String,
}

impl MigrationScript {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        let name = name.into();
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: format!("m{}_{}", created_at.format("%y%m%d_%H%M%S"), name),
            name,
            schema: schema.into(),
            created_at,
            operations: Vec::new(),
            checksum: String::new(),
        }
    }

    pub fn push(&mut self, operation: DdlOperation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn compute_checksum(&self) -> ResolverResult<String> {
        let serialized = serde_json::to_vec(&self.operations)?;
        Ok(format!("{:x}", Sha256::digest(&serialized)))
    }

    /// Fix the checksum over the current operations
    pub fn seal(&mut self) -> ResolverResult<()> {
        self.checksum = self.compute_checksum()?;
        Ok(())
    }

    pub fn verify(&self) -> ResolverResult<()> {
        if self.checksum.is_empty() {
            return Err(ResolverError::Script(format!("Script {} is not sealed", self.version)));
        }
        let actual = self.compute_checksum()?;
        if actual != self.checksum {
            return Err(ResolverError::Script(format!(
                "Checksum mismatch for {}: expected {}, found {}",
                self.version, self.checksum, actual
            )));
        }
        Ok(())
    }

    /// One statement per line
    pub fn to_sql(&self) -> String {
        let mut sql = format!("-- {}\n", self.version);
        for operation in &self.operations {
            sql.push_str(&operation.to_sql(&self.schema));
            sql.push_str(";\n");
        }
        sql
    }

    /// Write `{version}.json` and `{version}.sql` into `dir`, returning the
    /// JSON path
    pub async fn save(&self, dir: impl AsRef<Path>) -> ResolverResult<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let json_path = dir.join(format!("{}.json", self.version));
        tokio::fs::write(&json_path, serde_json::to_string_pretty(self)?).await?;
        tokio::fs::write(dir.join(format!("{}.sql", self.version)), self.to_sql()).await?;

        info!("Saved migration {} ({} operations)", self.version, self.len());
        Ok(json_path)
    }

    /// Read a saved script, rejecting it if the checksum does not match
    pub async fn load(path: impl AsRef<Path>) -> ResolverResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let script: MigrationScript = serde_json::from_str(&raw)?;
        script.verify()?;
        Ok(script)
    }

    /// Execute every operation through `sink`, in order
    pub async fn replay<S: DdlSink>(&self, sink: &S) -> ResolverResult<()> {
        self.verify()?;
        info!("Replaying {} ({} operations)", self.version, self.len());
        for operation in &self.operations {
            sink.execute(operation).await?;
        }
        Ok(())
    }
}

/// Sink that records into a script while keeping a projection of the schema
/// the script produces
#[derive(Debug)]
pub struct ScriptSink {
    projection: MemoryDatabase,
    script: RwLock<MigrationScript>,
}

impl ScriptSink {
    /// Start a script against the current state of `live`
    pub async fn project<I: SchemaInspector>(
        live: &I,
        name: impl Into<String>,
        schema: impl Into<String>,
    ) -> ResolverResult<Self> {
        let mut snapshots: Vec<TableSnapshot> = Vec::new();
        for table in live.table_names().await? {
            if let Some(snapshot) = live.table_schema(&table).await? {
                snapshots.push(snapshot);
            }
        }
        debug!("Projected {} tables for script mode", snapshots.len());

        Ok(Self {
            projection: MemoryDatabase::from_snapshots(
                live.table_prefix(),
                live.indexes_foreign_keys(),
                snapshots,
            ),
            script: RwLock::new(MigrationScript::new(name, schema)),
        })
    }

    pub async fn operations(&self) -> Vec<DdlOperation> {
        self.script.read().await.operations.clone()
    }

    /// Seal and hand over the recorded script
    pub fn finish(self) -> ResolverResult<MigrationScript> {
        let mut script = self.script.into_inner();
        script.seal()?;
        Ok(script)
    }
}

impl DdlSink for ScriptSink {
    fn mode(&self) -> SinkMode {
        SinkMode::Script
    }

    async fn execute(&self, operation: &DdlOperation) -> ResolverResult<()> {
        self.projection.execute(operation).await?;
        self.script.write().await.push(operation.clone());
        Ok(())
    }
}

impl SchemaInspector for ScriptSink {
    fn table_prefix(&self) -> &str {
        self.projection.table_prefix()
    }

    fn indexes_foreign_keys(&self) -> bool {
        self.projection.indexes_foreign_keys()
    }

    async fn table_names(&self) -> ResolverResult<Vec<String>> {
        self.projection.table_names().await
    }

    async fn table_schema(&self, name: &str) -> ResolverResult<Option<TableSnapshot>> {
        self.projection.table_schema(name).await
    }

    async fn refresh(&self) -> ResolverResult<()> {
        self.projection.refresh().await
    }

    async fn refresh_table(&self, name: &str) -> ResolverResult<()> {
        self.projection.refresh_table(name).await
    }
}
