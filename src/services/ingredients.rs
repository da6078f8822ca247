use rust_decimal::Decimal;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::{with_storage_timeout, with_transaction};
use crate::entities::ingredient::{self, IngredientUnit};
use crate::errors::ServiceError;
use crate::repositories::{IngredientRepository, OrderRepository, ProductRepository};
use crate::tenancy::TenantHandle;

fn validate_min_stock(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("min_stock");
        err.message = Some("Minimum stock must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateIngredientRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    #[serde(default)]
    pub unit: IngredientUnit,
    #[serde(default)]
    pub stock: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_min_stock")]
    pub min_stock: Decimal,
}

/// Partial update. Setting `stock` records a physical count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateIngredientRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: Option<String>,
    pub unit: Option<IngredientUnit>,
    pub stock: Option<Decimal>,
    #[validate(custom = "validate_min_stock")]
    pub min_stock: Option<Decimal>,
}

/// Ingredient CRUD over one tenant's ledger.
#[derive(Clone)]
pub struct IngredientService {
    storage_timeout: Duration,
}

impl IngredientService {
    pub fn new(storage_timeout: Duration) -> Self {
        Self { storage_timeout }
    }

    #[instrument(skip(self, tenant, request), fields(tenant = %tenant.slug()))]
    pub async fn create(
        &self,
        tenant: &TenantHandle,
        request: CreateIngredientRequest,
    ) -> Result<ingredient::Model, ServiceError> {
        request.validate()?;
        let created = with_storage_timeout(self.storage_timeout, "create_ingredient", async {
            IngredientRepository::new(&tenant.db)
                .insert(
                    request.name.trim().to_string(),
                    request.unit,
                    request.stock,
                    request.min_stock,
                )
                .await
        })
        .await?;
        info!(ingredient_id = %created.id, "Ingredient created");
        Ok(created)
    }

    pub async fn list(&self, tenant: &TenantHandle) -> Result<Vec<ingredient::Model>, ServiceError> {
        with_storage_timeout(self.storage_timeout, "list_ingredients", async {
            IngredientRepository::new(&tenant.db).list().await
        })
        .await
    }

    pub async fn get(
        &self,
        tenant: &TenantHandle,
        id: Uuid,
    ) -> Result<ingredient::Model, ServiceError> {
        with_storage_timeout(self.storage_timeout, "get_ingredient", async {
            IngredientRepository::new(&tenant.db).get(id).await
        })
        .await
    }

    /// Ingredients whose stock is under their minimum, negatives included.
    pub async fn low_stock(
        &self,
        tenant: &TenantHandle,
    ) -> Result<Vec<ingredient::Model>, ServiceError> {
        with_storage_timeout(self.storage_timeout, "low_stock", async {
            IngredientRepository::new(&tenant.db).low_stock().await
        })
        .await
    }

    #[instrument(skip(self, tenant, request), fields(tenant = %tenant.slug()))]
    pub async fn update(
        &self,
        tenant: &TenantHandle,
        id: Uuid,
        request: UpdateIngredientRequest,
    ) -> Result<ingredient::Model, ServiceError> {
        request.validate()?;
        with_storage_timeout(self.storage_timeout, "update_ingredient", async move {
            let repo = IngredientRepository::new(&tenant.db);
            let mut model: ingredient::ActiveModel = repo.get(id).await?.into();
            if let Some(name) = request.name {
                model.name = Set(name.trim().to_string());
            }
            if let Some(unit) = request.unit {
                model.unit = Set(unit);
            }
            if let Some(stock) = request.stock {
                model.stock = Set(stock);
            }
            if let Some(min_stock) = request.min_stock {
                model.min_stock = Set(min_stock);
            }
            repo.update(model).await
        })
        .await
    }

    /// Deletes an ingredient that no recipe and no open order item references.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn delete(&self, tenant: &TenantHandle, id: Uuid) -> Result<(), ServiceError> {
        with_storage_timeout(self.storage_timeout, "delete_ingredient", async {
            with_transaction(&tenant.db, move |txn| {
                Box::pin(async move {
                    if ProductRepository::new(txn).ingredient_in_use(id).await? {
                        return Err(ServiceError::Conflict(format!(
                            "ingredient {} is used by a product recipe",
                            id
                        )));
                    }
                    let open_items = OrderRepository::new(txn).open_items().await?;
                    if open_items
                        .iter()
                        .any(|item| item.customization.references_ingredient(&id))
                    {
                        return Err(ServiceError::Conflict(format!(
                            "ingredient {} is customised on an open order",
                            id
                        )));
                    }
                    IngredientRepository::new(txn).delete(id).await
                })
            })
            .await
        })
        .await?;
        info!(ingredient_id = %id, "Ingredient deleted");
        Ok(())
    }
}
