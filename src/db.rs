pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

pub use transaction::with_transaction;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// Pool settings from the app config pointed at an arbitrary store
    pub fn for_url(cfg: &AppConfig, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::for_url(cfg, cfg.directory_database_url.clone())
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns the driver error if the pool cannot be created
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("comanda.db.max_connections", config.max_connections as f64);

    let pool = Database::connect(opt).await?;
    debug!("Database connection pool established");
    Ok(pool)
}

/// Runs the tenant directory migrations
pub async fn run_directory_migrations(pool: &DbPool) -> Result<(), DbErr> {
    run_migrator::<crate::migrator::DirectoryMigrator>(pool, "directory").await
}

/// Runs the per-tenant schema migrations
pub async fn run_tenant_migrations(pool: &DbPool) -> Result<(), DbErr> {
    run_migrator::<crate::migrator::TenantMigrator>(pool, "tenant").await
}

async fn run_migrator<M: MigratorTrait>(pool: &DbPool, scope: &'static str) -> Result<(), DbErr> {
    info!(scope, "Running database migrations");
    let start = std::time::Instant::now();

    let result = M::up(pool, None).await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(scope, ?elapsed, "Database migrations completed"),
        Err(e) => {
            counter!("comanda.db.migration_failures", 1, "scope" => scope);
            error!(scope, ?elapsed, error = %e, "Database migrations failed");
        }
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let start = std::time::Instant::now();
    let result = pool.ping().await;
    if let Err(e) = &result {
        error!(elapsed = ?start.elapsed(), error = %e, "Database connection check failed");
        counter!("comanda.db.connection_failures", 1);
    }
    result
}

/// Bounds a storage operation by the deployment's I/O timeout.
///
/// An elapsed timer drops the inner future, which rolls back any open
/// transaction it owns, and surfaces as `StorageUnavailable`.
pub async fn with_storage_timeout<T, F>(
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            counter!("comanda.db.timeouts", 1, "operation" => operation);
            error!(operation, ?timeout, "Storage operation timed out");
            Err(ServiceError::StorageUnavailable(format!(
                "{} timed out after {:?}",
                operation, timeout
            )))
        }
    }
}
