//! Connection pool setup, migrations and connection health.

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type DbPool = DatabaseConnection;

/// Pool tuning, lifted out of [`AppConfig`] so connection code does not
/// depend on the full application configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Opens the pool described by the application configuration.
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    connect_pool(&DbConfig::from(cfg)).await
}

async fn connect_pool(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(?config, "opening database pool");

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    gauge!("storefront_db.max_connections", config.max_connections as f64);

    let pool = Database::connect(options)
        .await
        .map_err(ServiceError::DatabaseError)?;
    info!(
        max_connections = config.max_connections,
        "database pool ready"
    );

    Ok(pool)
}

/// Brings the schema up to date. Safe to call on every boot; applied
/// migrations are skipped.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| {
            error!("migrations failed after {:?}: {}", started.elapsed(), e);
            ServiceError::DatabaseError(e)
        })?;
    info!("migrations up to date in {:?}", started.elapsed());
    Ok(())
}

/// Pings the pool. The readiness probe calls this per request.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            gauge!(
                "storefront_db.connection_latency",
                started.elapsed().as_millis() as f64
            );
            Ok(())
        }
        Err(e) => {
            counter!("storefront_db.connection_failures", 1);
            error!("database ping failed: {}", e);
            Err(ServiceError::DatabaseError(e))
        }
    }
}

/// Records the duration of one named database operation.
pub fn record_db_operation(operation: &str, elapsed: Duration) {
    histogram!("storefront_db.operation.duration", elapsed, "operation" => operation.to_string());
}
