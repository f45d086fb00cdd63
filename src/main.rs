//! SchemaFlow Migrate - migration runner
//!
//! Loads a plan of schema mutations and runs it through the dependency
//! resolver inside a single transaction.
//!
//! - `MIGRATION_MODE=immediate`: statements execute on the transaction, which
//!   commits once every mutation has succeeded
//! - `MIGRATION_MODE=script`: statements are recorded into a migration script
//!   under `MIGRATION_OUTPUT_DIR` and the database is left untouched

use schemaflow_migrate::config::{DatabaseConfig, Settings};
use schemaflow_migrate::{DependencyResolver, MigrationPlan, NamingScheme, PgSession, ScriptSink, SinkMode};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting SchemaFlow Migrate...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let plan = MigrationPlan::load(&settings.migration.plan).await?;
    info!(
        "Loaded plan {} ({} mutations, {:?} mode)",
        plan.name,
        plan.mutations.len(),
        settings.migration.mode
    );
    for mutation in plan.mutations.iter().filter(|m| m.is_destructive()) {
        warn!("Destructive mutation in plan: {}", mutation.description());
    }

    let pool = init_database_pool(&settings.database).await?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;
    let naming = NamingScheme::new(settings.migration.max_identifier_length);

    match settings.migration.mode {
        SinkMode::Immediate => {
            {
                let session = PgSession::new(&tx, &settings.database.schema, &settings.migration.table_prefix);
                DependencyResolver::new(&session, &session, naming)
                    .run_plan(&plan)
                    .await?;
            }
            tx.commit().await?;
            info!("Plan {} applied and committed", plan.name);
        }
        SinkMode::Script => {
            let sink = {
                let session = PgSession::new(&tx, &settings.database.schema, &settings.migration.table_prefix);
                ScriptSink::project(&session, &plan.name, &settings.database.schema).await?
            };
            DependencyResolver::new(&sink, &sink, naming).run_plan(&plan).await?;

            let script = sink.finish()?;
            let path = script.save(&settings.migration.output_dir).await?;
            tx.rollback().await?;
            info!(
                "Recorded {} operations for {} into {}",
                script.len(),
                plan.name,
                path.display()
            );
        }
    }

    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemaflow_migrate=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Create the connection pool, with TLS when the server requires it
async fn init_database_pool(config: &DatabaseConfig) -> anyhow::Result<deadpool_postgres::Pool> {
    use deadpool_postgres::{Config, ManagerConfig, PoolConfig, RecyclingMethod, Runtime};

    // Neon only accepts TLS connections
    let use_tls = config.require_tls || config.host.contains("neon.tech");

    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;
    client
        .query_one("SELECT 1", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!(
        "Connected to {}:{}/{} (TLS: {})",
        config.host, config.port, config.database, use_tls
    );
    Ok(pool)
}
