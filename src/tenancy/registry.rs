use async_trait::async_trait;
use dashmap::DashMap;
use metrics::{counter, gauge};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::db::{self, DbConfig};
use crate::errors::ServiceError;

/// Opens a fresh handle to one tenant store.
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    async fn open(&self, storage_location: &str) -> Result<DatabaseConnection, DbErr>;
}

/// Opens tenant stores from the configured URL template, migrating them
/// first when `auto_migrate` is set.
pub struct SeaOrmConnectionOpener {
    config: Arc<AppConfig>,
}

impl SeaOrmConnectionOpener {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionOpener for SeaOrmConnectionOpener {
    async fn open(&self, storage_location: &str) -> Result<DatabaseConnection, DbErr> {
        let url = self.config.tenant_database_url(storage_location);
        let pool =
            db::establish_connection_with_config(&DbConfig::for_url(&self.config, url)).await?;
        if self.config.auto_migrate {
            db::run_tenant_migrations(&pool).await?;
        }
        Ok(pool)
    }
}

type HandleCell = Arc<OnceCell<DatabaseConnection>>;

/// Process-wide cache of tenant store handles keyed by storage location.
///
/// Cached reads take only a shard read lock. The first caller for a key
/// opens the handle while later callers for the same key wait on the same
/// cell, so one location never gets two handles. A failed open leaves the
/// cell empty and the next caller tries again.
pub struct TenantConnectionRegistry {
    opener: Arc<dyn ConnectionOpener>,
    handles: DashMap<String, HandleCell>,
    open_timeout: Duration,
}

impl TenantConnectionRegistry {
    pub fn new(opener: Arc<dyn ConnectionOpener>, open_timeout: Duration) -> Self {
        Self {
            opener,
            handles: DashMap::new(),
            open_timeout,
        }
    }

    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let timeout = config.storage_timeout();
        Self::new(Arc::new(SeaOrmConnectionOpener::new(config)), timeout)
    }

    /// Returns the cached handle for `storage_location`, opening it on first use.
    #[instrument(skip(self))]
    pub async fn get_connection(
        &self,
        storage_location: &str,
    ) -> Result<DatabaseConnection, ServiceError> {
        if let Some(conn) = self
            .handles
            .get(storage_location)
            .and_then(|cell| cell.get().cloned())
        {
            return Ok(conn);
        }

        let cell = self
            .handles
            .entry(storage_location.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let conn = cell
            .get_or_try_init(|| self.open(storage_location))
            .await?;
        Ok(conn.clone())
    }

    async fn open(&self, storage_location: &str) -> Result<DatabaseConnection, ServiceError> {
        let result =
            tokio::time::timeout(self.open_timeout, self.opener.open(storage_location)).await;
        match result {
            Ok(Ok(conn)) => {
                counter!("comanda.registry.open", 1, "outcome" => "ok");
                gauge!("comanda.registry.handles", self.handles.len() as f64);
                info!(storage_location, "Opened tenant store");
                Ok(conn)
            }
            Ok(Err(e)) => {
                counter!("comanda.registry.open", 1, "outcome" => "error");
                warn!(storage_location, error = %e, "Failed to open tenant store");
                Err(ServiceError::StorageUnavailable(format!(
                    "cannot open store {}: {}",
                    storage_location, e
                )))
            }
            Err(_) => {
                counter!("comanda.registry.open", 1, "outcome" => "timeout");
                warn!(storage_location, timeout = ?self.open_timeout, "Timed out opening tenant store");
                Err(ServiceError::StorageUnavailable(format!(
                    "opening store {} timed out",
                    storage_location
                )))
            }
        }
    }

    /// Whether a live handle is cached for the location
    pub fn is_cached(&self, storage_location: &str) -> bool {
        self.handles
            .get(storage_location)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    pub fn cached_locations(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drops the cached handle; the pool closes once in-flight users release it.
    pub fn evict(&self, storage_location: &str) -> bool {
        let removed = self.handles.remove(storage_location).is_some();
        if removed {
            info!(storage_location, "Evicted tenant store handle");
            gauge!("comanda.registry.handles", self.handles.len() as f64);
        }
        removed
    }

    /// Evicts every cached location not present in `active_locations`.
    pub fn retain_only(&self, active_locations: &[String]) -> usize {
        let stale: Vec<String> = self
            .handles
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| !active_locations.contains(key))
            .collect();
        stale.iter().filter(|key| self.evict(key)).count()
    }

    /// Closes every cached handle. Used on process shutdown.
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some((_, cell)) = self.handles.remove(&key) else {
                continue;
            };
            let Some(conn) = cell.get().cloned() else {
                continue;
            };
            if let Err(e) = conn.close().await {
                warn!(storage_location = %key, error = %e, "Error closing tenant store");
            }
        }
        gauge!("comanda.registry.handles", 0.0);
        info!("Tenant connection registry shut down");
    }
}
