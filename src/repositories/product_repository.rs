use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::product::{self, Entity as Product};
use crate::entities::product_ingredient::{self, Entity as ProductIngredient};
use crate::errors::ServiceError;

/// One recipe entry as written by callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub ingredient_id: Uuid,
    pub quantity: Decimal,
}

/// A product with its recipe in entry order. SIMPLE products carry none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductWithRecipe {
    #[serde(flatten)]
    pub product: product::Model,
    pub recipe: Vec<RecipeLine>,
}

/// Catalog accessor: one tenant's products and recipes.
pub struct ProductRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> ProductRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find_by_id(id).one(self.db).await?)
    }

    pub async fn list(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .order_by_asc(product::Column::Name)
            .all(self.db)
            .await?)
    }

    pub async fn find_with_recipe(
        &self,
        id: Uuid,
    ) -> Result<Option<ProductWithRecipe>, ServiceError> {
        let Some(product) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut found = self.attach_recipes(vec![product]).await?;
        Ok(found.pop())
    }

    /// Loads products and their recipes keyed by product id. Unknown ids are
    /// simply absent from the map.
    pub async fn find_many_with_recipes(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ProductWithRecipe>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let products = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(self.db)
            .await?;
        Ok(self
            .attach_recipes(products)
            .await?
            .into_iter()
            .map(|p| (p.product.id, p))
            .collect())
    }

    async fn attach_recipes(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductWithRecipe>, ServiceError> {
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let lines = if ids.is_empty() {
            Vec::new()
        } else {
            ProductIngredient::find()
                .filter(product_ingredient::Column::ProductId.is_in(ids))
                .order_by_asc(product_ingredient::Column::ProductId)
                .order_by_asc(product_ingredient::Column::Position)
                .all(self.db)
                .await?
        };

        let mut by_product: HashMap<Uuid, Vec<RecipeLine>> = HashMap::new();
        for line in lines {
            by_product.entry(line.product_id).or_default().push(RecipeLine {
                ingredient_id: line.ingredient_id,
                quantity: line.quantity,
            });
        }

        Ok(products
            .into_iter()
            .map(|product| {
                let recipe = if product.is_composed() {
                    by_product.remove(&product.id).unwrap_or_default()
                } else {
                    Vec::new()
                };
                ProductWithRecipe { product, recipe }
            })
            .collect())
    }

    pub async fn insert(&self, model: product::ActiveModel) -> Result<product::Model, ServiceError> {
        Ok(model.insert(self.db).await?)
    }

    pub async fn update(
        &self,
        mut model: product::ActiveModel,
    ) -> Result<product::Model, ServiceError> {
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.db).await?)
    }

    /// Replaces the stored recipe with `lines`, keeping their order.
    pub async fn replace_recipe(
        &self,
        product_id: Uuid,
        lines: &[RecipeLine],
    ) -> Result<(), ServiceError> {
        ProductIngredient::delete_many()
            .filter(product_ingredient::Column::ProductId.eq(product_id))
            .exec(self.db)
            .await?;

        if lines.is_empty() {
            return Ok(());
        }

        let rows = lines
            .iter()
            .enumerate()
            .map(|(position, line)| product_ingredient::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                ingredient_id: Set(line.ingredient_id),
                position: Set(position as i32),
                quantity: Set(line.quantity),
            });
        ProductIngredient::insert_many(rows).exec(self.db).await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        ProductIngredient::delete_many()
            .filter(product_ingredient::Column::ProductId.eq(id))
            .exec(self.db)
            .await?;
        let res = Product::delete_by_id(id).exec(self.db).await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        Ok(())
    }

    /// Whether any recipe references the ingredient
    pub async fn ingredient_in_use(&self, ingredient_id: Uuid) -> Result<bool, ServiceError> {
        let count = ProductIngredient::find()
            .filter(product_ingredient::Column::IngredientId.eq(ingredient_id))
            .count(self.db)
            .await?;
        Ok(count > 0)
    }
}
