use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::tenant::{self, Entity as Tenant, TenantPlan, TenantStatus};
use crate::errors::ServiceError;

/// A tenant that passed resolution: it exists and is active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTenant {
    pub slug: String,
    pub storage_location: String,
    pub status: TenantStatus,
    pub plan: TenantPlan,
}

impl From<&tenant::Model> for ResolvedTenant {
    fn from(model: &tenant::Model) -> Self {
        Self {
            slug: model.slug.clone(),
            storage_location: model.storage_location.clone(),
            status: model.status,
            plan: model.plan,
        }
    }
}

/// Shared store mapping tenant slugs to their metadata.
#[derive(Clone)]
pub struct TenantDirectory {
    db: DatabaseConnection,
}

impl TenantDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<tenant::Model>, ServiceError> {
        Ok(Tenant::find()
            .filter(tenant::Column::Slug.eq(slug))
            .one(&self.db)
            .await?)
    }

    pub async fn get(&self, slug: &str) -> Result<tenant::Model, ServiceError> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::TenantNotFound(slug.to_string()))
    }

    /// Resolves a request-level tenant identifier to an active tenant.
    #[instrument(skip(self))]
    pub async fn resolve(&self, slug: &str) -> Result<ResolvedTenant, ServiceError> {
        let model = self.get(slug).await?;
        if !model.is_active() {
            return Err(ServiceError::TenantInactive(slug.to_string()));
        }
        Ok(ResolvedTenant::from(&model))
    }

    /// Inserts a new active tenant. A taken slug is a `Conflict`.
    pub async fn insert(
        &self,
        name: &str,
        slug: &str,
        plan: TenantPlan,
    ) -> Result<tenant::Model, ServiceError> {
        if self.find_by_slug(slug).await?.is_some() {
            return Err(ServiceError::Conflict(format!("tenant slug '{}' is taken", slug)));
        }

        let now = Utc::now();
        let model = tenant::ActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(slug.to_string()),
            name: Set(name.to_string()),
            storage_location: Set(tenant::storage_location_for(slug)),
            plan: Set(plan),
            status: Set(TenantStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // A concurrent registration can still win between the check and the insert
        let inserted = model.insert(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict(format!("tenant slug '{}' is taken", slug))
            }
            _ => ServiceError::from(e),
        })?;
        info!(slug, storage_location = %inserted.storage_location, "Tenant registered");
        Ok(inserted)
    }

    pub async fn set_status(
        &self,
        slug: &str,
        status: TenantStatus,
    ) -> Result<tenant::Model, ServiceError> {
        let mut model: tenant::ActiveModel = self.get(slug).await?.into();
        model.status = Set(status);
        model.updated_at = Set(Utc::now());
        Ok(model.update(&self.db).await?)
    }

    pub async fn set_plan(
        &self,
        slug: &str,
        plan: TenantPlan,
    ) -> Result<tenant::Model, ServiceError> {
        let mut model: tenant::ActiveModel = self.get(slug).await?.into();
        model.plan = Set(plan);
        model.updated_at = Set(Utc::now());
        Ok(model.update(&self.db).await?)
    }

    pub async fn list(&self) -> Result<Vec<tenant::Model>, ServiceError> {
        Ok(Tenant::find()
            .order_by_asc(tenant::Column::Slug)
            .all(&self.db)
            .await?)
    }

    pub async fn active_storage_locations(&self) -> Result<Vec<String>, DbErr> {
        Ok(Tenant::find()
            .filter(tenant::Column::Status.eq(TenantStatus::Active))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|t| t.storage_location)
            .collect())
    }
}
