use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::{with_storage_timeout, with_transaction};
use crate::entities::product::{self, ProductType};
use crate::errors::ServiceError;
use crate::repositories::{
    IngredientRepository, OrderRepository, ProductRepository, ProductWithRecipe, RecipeLine,
};
use crate::tenancy::TenantHandle;

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn default_allows_extras() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub category: Option<String>,
    #[serde(default)]
    pub product_type: ProductType,
    #[serde(default)]
    pub allows_half: bool,
    #[serde(default = "default_allows_extras")]
    pub allows_extras: bool,
    /// Recipe; ignored for SIMPLE products
    #[serde(default)]
    pub ingredients: Vec<RecipeLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub product_type: Option<ProductType>,
    pub allows_half: Option<bool>,
    pub allows_extras: Option<bool>,
    /// Replaces the whole recipe when present
    pub ingredients: Option<Vec<RecipeLine>>,
}

/// Recipe to store for a product of `product_type`.
///
/// SIMPLE products keep none. COMPOSED ones need at least one entry, every
/// quantity positive and each ingredient listed once.
pub fn normalize_recipe(
    product_type: ProductType,
    lines: Vec<RecipeLine>,
) -> Result<Vec<RecipeLine>, ServiceError> {
    if product_type == ProductType::Simple {
        return Ok(Vec::new());
    }
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "a composed product needs at least one ingredient".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for line in &lines {
        if line.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "recipe quantity for ingredient {} must be positive",
                line.ingredient_id
            )));
        }
        if !seen.insert(line.ingredient_id) {
            return Err(ServiceError::ValidationError(format!(
                "ingredient {} appears twice in the recipe",
                line.ingredient_id
            )));
        }
    }
    Ok(lines)
}

async fn ensure_ingredients_exist<C: sea_orm::ConnectionTrait>(
    db: &C,
    lines: &[RecipeLine],
) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = lines.iter().map(|l| l.ingredient_id).collect();
    let known: BTreeSet<Uuid> = IngredientRepository::new(db)
        .find_many(&ids)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();
    match ids.iter().find(|id| !known.contains(id)) {
        Some(missing) => Err(ServiceError::NotFound(format!("Ingredient {} not found", missing))),
        None => Ok(()),
    }
}

/// Product catalog CRUD over one tenant's store.
#[derive(Clone)]
pub struct ProductService {
    storage_timeout: Duration,
}

impl ProductService {
    pub fn new(storage_timeout: Duration) -> Self {
        Self { storage_timeout }
    }

    #[instrument(skip(self, tenant, request), fields(tenant = %tenant.slug(), name = %request.name))]
    pub async fn create(
        &self,
        tenant: &TenantHandle,
        request: CreateProductRequest,
    ) -> Result<ProductWithRecipe, ServiceError> {
        request.validate()?;
        let recipe = normalize_recipe(request.product_type, request.ingredients)?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            price: Set(request.price),
            category: Set(request.category),
            product_type: Set(request.product_type),
            allows_half: Set(request.allows_half),
            allows_extras: Set(request.allows_extras),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = with_storage_timeout(self.storage_timeout, "create_product", async move {
            with_transaction(&tenant.db, move |txn| {
                Box::pin(async move {
                    ensure_ingredients_exist(txn, &recipe).await?;
                    let products = ProductRepository::new(txn);
                    let product = products.insert(model).await?;
                    products.replace_recipe(product.id, &recipe).await?;
                    Ok(ProductWithRecipe { product, recipe })
                })
            })
            .await
        })
        .await?;

        info!(product_id = %created.product.id, "Product created");
        Ok(created)
    }

    pub async fn list(&self, tenant: &TenantHandle) -> Result<Vec<product::Model>, ServiceError> {
        with_storage_timeout(self.storage_timeout, "list_products", async {
            ProductRepository::new(&tenant.db).list().await
        })
        .await
    }

    pub async fn get(
        &self,
        tenant: &TenantHandle,
        id: Uuid,
    ) -> Result<ProductWithRecipe, ServiceError> {
        with_storage_timeout(self.storage_timeout, "get_product", async {
            ProductRepository::new(&tenant.db)
                .find_with_recipe(id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
        })
        .await
    }

    /// Updates fields and, when the type or recipe changes, rewrites the recipe.
    #[instrument(skip(self, tenant, request), fields(tenant = %tenant.slug()))]
    pub async fn update(
        &self,
        tenant: &TenantHandle,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductWithRecipe, ServiceError> {
        request.validate()?;

        with_storage_timeout(self.storage_timeout, "update_product", async move {
            with_transaction(&tenant.db, move |txn| {
                Box::pin(async move {
                    let products = ProductRepository::new(txn);
                    let current = products
                        .find_with_recipe(id)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

                    let product_type = request.product_type.unwrap_or(current.product.product_type);
                    let rewrite = request.ingredients.is_some()
                        || product_type != current.product.product_type;
                    let recipe = match request.ingredients {
                        Some(lines) => normalize_recipe(product_type, lines)?,
                        None => normalize_recipe(product_type, current.recipe)?,
                    };

                    let mut model: product::ActiveModel = current.product.into();
                    if let Some(name) = request.name {
                        model.name = Set(name.trim().to_string());
                    }
                    if let Some(price) = request.price {
                        model.price = Set(price);
                    }
                    if request.category.is_some() {
                        model.category = Set(request.category);
                    }
                    if let Some(allows_half) = request.allows_half {
                        model.allows_half = Set(allows_half);
                    }
                    if let Some(allows_extras) = request.allows_extras {
                        model.allows_extras = Set(allows_extras);
                    }
                    model.product_type = Set(product_type);

                    let product = products.update(model).await?;
                    if rewrite {
                        ensure_ingredients_exist(txn, &recipe).await?;
                        products.replace_recipe(id, &recipe).await?;
                    }
                    Ok(ProductWithRecipe { product, recipe })
                })
            })
            .await
        })
        .await
    }

    /// Deletes a product that no open order sells, whole or by halves.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn delete(&self, tenant: &TenantHandle, id: Uuid) -> Result<(), ServiceError> {
        with_storage_timeout(self.storage_timeout, "delete_product", async {
            with_transaction(&tenant.db, move |txn| {
                Box::pin(async move {
                    let open_items = OrderRepository::new(txn).open_items().await?;
                    if open_items.iter().any(|item| item.references_product(&id)) {
                        return Err(ServiceError::Conflict(format!(
                            "product {} is on an open order",
                            id
                        )));
                    }
                    ProductRepository::new(txn).delete(id).await
                })
            })
            .await
        })
        .await?;
        info!(product_id = %id, "Product deleted");
        Ok(())
    }
}
