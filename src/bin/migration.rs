//! Migrates the tenant directory and then every registered tenant store.

use anyhow::{bail, Context};
use comanda_api::{
    config,
    db::{self, DbConfig},
    tenancy::TenantDirectory,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    info!("Starting database migration");

    let directory_db = db::establish_connection_with_config(&DbConfig::from(&cfg))
        .await
        .context("failed to connect to the tenant directory")?;
    db::run_directory_migrations(&directory_db)
        .await
        .context("directory migrations failed")?;

    let tenants = TenantDirectory::new(directory_db.clone())
        .list()
        .await
        .context("failed to list tenants")?;
    info!(tenants = tenants.len(), "Migrating tenant stores");

    let mut failed = Vec::new();
    for tenant in &tenants {
        let store = DbConfig::for_url(&cfg, cfg.tenant_database_url(&tenant.storage_location));
        let result = async {
            let pool = db::establish_connection_with_config(&store).await?;
            db::run_tenant_migrations(&pool).await?;
            pool.close().await
        }
        .await;

        match result {
            Ok(()) => info!(slug = %tenant.slug, "Tenant store migrated"),
            Err(e) => {
                error!(slug = %tenant.slug, error = %e, "Tenant store migration failed");
                failed.push(tenant.slug.clone());
            }
        }
    }

    directory_db.close().await.ok();

    if !failed.is_empty() {
        bail!("migrations failed for tenants: {}", failed.join(", "));
    }
    info!("Migration completed successfully");
    Ok(())
}
