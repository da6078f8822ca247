use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::ingredient::{self, Entity as Ingredient, IngredientUnit};
use crate::errors::ServiceError;

/// Ledger accessor: one tenant's ingredient stock records.
pub struct IngredientRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> IngredientRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ingredient::Model>, ServiceError> {
        Ok(Ingredient::find_by_id(id).one(self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ingredient::Model, ServiceError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Ingredient {} not found", id)))
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<ingredient::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Ingredient::find()
            .filter(ingredient::Column::Id.is_in(ids.iter().copied()))
            .all(self.db)
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<ingredient::Model>, ServiceError> {
        Ok(Ingredient::find()
            .order_by_asc(ingredient::Column::Name)
            .all(self.db)
            .await?)
    }

    /// Ingredients whose stock is below their minimum, negatives included
    pub async fn low_stock(&self) -> Result<Vec<ingredient::Model>, ServiceError> {
        Ok(Ingredient::find()
            .filter(Expr::col(ingredient::Column::Stock).lt(Expr::col(ingredient::Column::MinStock)))
            .order_by_asc(ingredient::Column::Name)
            .all(self.db)
            .await?)
    }

    pub async fn insert(
        &self,
        name: String,
        unit: IngredientUnit,
        stock: Decimal,
        min_stock: Decimal,
    ) -> Result<ingredient::Model, ServiceError> {
        let now = Utc::now();
        let model = ingredient::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            unit: Set(unit),
            stock: Set(stock),
            min_stock: Set(min_stock),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db).await?)
    }

    pub async fn update(
        &self,
        mut model: ingredient::ActiveModel,
    ) -> Result<ingredient::Model, ServiceError> {
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.db).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let res = Ingredient::delete_by_id(id).exec(self.db).await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Ingredient {} not found", id)));
        }
        Ok(())
    }

    /// Adds `delta` to the stored stock in a single UPDATE.
    ///
    /// The arithmetic happens in the store, so concurrent decrements of the
    /// same ingredient never lose an update. No floor is applied.
    pub async fn apply_delta(&self, id: Uuid, delta: Decimal) -> Result<(), ServiceError> {
        let res = Ingredient::update_many()
            .col_expr(
                ingredient::Column::Stock,
                Expr::col(ingredient::Column::Stock).add(delta),
            )
            .col_expr(ingredient::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(ingredient::Column::Id.eq(id))
            .exec(self.db)
            .await
            .map_err(|e| ServiceError::InventoryError(format!("stock update for {} failed: {}", id, e)))?;

        if res.rows_affected == 0 {
            return Err(ServiceError::InventoryError(format!(
                "ingredient {} is missing from the ledger",
                id
            )));
        }
        Ok(())
    }
}
