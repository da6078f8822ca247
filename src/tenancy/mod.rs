//! Tenant resolution and per-tenant storage handles.

pub mod directory;
pub mod registry;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

pub use directory::{ResolvedTenant, TenantDirectory};
pub use registry::{ConnectionOpener, SeaOrmConnectionOpener, TenantConnectionRegistry};

use crate::errors::ServiceError;

/// A resolved, active tenant together with a live handle to its store.
///
/// Every core operation receives one of these explicitly.
#[derive(Clone, Debug)]
pub struct TenantHandle {
    pub tenant: ResolvedTenant,
    pub db: DatabaseConnection,
}

impl TenantHandle {
    pub fn slug(&self) -> &str {
        &self.tenant.slug
    }
}

/// Directory plus registry: turns a slug into a `TenantHandle`.
#[derive(Clone)]
pub struct Tenancy {
    pub directory: TenantDirectory,
    pub registry: Arc<TenantConnectionRegistry>,
}

impl Tenancy {
    pub fn new(directory: TenantDirectory, registry: Arc<TenantConnectionRegistry>) -> Self {
        Self {
            directory,
            registry,
        }
    }

    /// Resolves the tenant and opens (or reuses) its store.
    pub async fn open(&self, slug: &str) -> Result<TenantHandle, ServiceError> {
        let tenant = self.directory.resolve(slug).await?;
        let db = self.registry.get_connection(&tenant.storage_location).await?;
        Ok(TenantHandle { tenant, db })
    }

    /// Drops cached handles of tenants that are no longer active.
    pub async fn evict_inactive(&self) -> Result<usize, ServiceError> {
        let active = self.directory.active_storage_locations().await?;
        let evicted = self.registry.retain_only(&active);
        if evicted > 0 {
            info!(evicted, "Evicted handles of inactive tenants");
        }
        Ok(evicted)
    }
}
