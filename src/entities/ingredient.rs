use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of measure for an ingredient's stock.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum IngredientUnit {
    #[sea_orm(string_value = "unit")]
    #[serde(rename = "unit")]
    #[strum(serialize = "unit")]
    Unit,
    #[sea_orm(string_value = "g")]
    #[serde(rename = "g")]
    #[strum(serialize = "g")]
    Gram,
    #[sea_orm(string_value = "kg")]
    #[serde(rename = "kg")]
    #[strum(serialize = "kg")]
    Kilogram,
    #[sea_orm(string_value = "ml")]
    #[serde(rename = "ml")]
    #[strum(serialize = "ml")]
    Milliliter,
    #[sea_orm(string_value = "l")]
    #[serde(rename = "l")]
    #[strum(serialize = "l")]
    Liter,
}

impl Default for IngredientUnit {
    fn default() -> Self {
        Self::Unit
    }
}

/// The `ingredients` table: one tenant's stock ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ingredients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub unit: IngredientUnit,
    /// Signed; consumption never blocks on insufficient stock
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub stock: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_stock: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_below_minimum(&self) -> bool {
        self.stock < self.min_stock
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
