use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Per-item override of one ingredient's effective quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub ingredient_id: Uuid,
    #[serde(default)]
    pub name: String,
    /// Recipe baseline; zero when the ingredient is not in the recipe
    #[serde(default)]
    pub base_quantity: Decimal,
    /// Effective quantity requested for this item
    pub quantity: Decimal,
    #[serde(default)]
    pub is_extra: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraIngredient {
    pub ingredient_id: Uuid,
    pub quantity: Decimal,
}

/// Customisation recorded with an order item, stored as one JSON column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ItemCustomization {
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub removed_ingredients: Vec<Uuid>,
    #[serde(default)]
    pub extra_ingredients: Vec<ExtraIngredient>,
    /// Products making up a half/half item
    #[serde(default)]
    pub halves: Vec<Uuid>,
}

impl ItemCustomization {
    /// Builds the customisation, deriving removed and extra ingredients from
    /// the modifiers when any are given. Callers pass either modifiers or the
    /// explicit lists, never both.
    ///
    /// A modifier at zero on a baseline ingredient is a removal. A modifier
    /// above its baseline is an extra of the difference; with no baseline the
    /// whole effective quantity is extra.
    pub fn new(
        modifiers: Vec<Modifier>,
        removed_ingredients: Vec<Uuid>,
        extra_ingredients: Vec<ExtraIngredient>,
        halves: Vec<Uuid>,
    ) -> Self {
        if modifiers.is_empty() {
            return Self {
                modifiers,
                removed_ingredients,
                extra_ingredients,
                halves,
            };
        }

        let mut removed = Vec::new();
        let mut extras = Vec::new();
        for m in &modifiers {
            let has_baseline = m.base_quantity > Decimal::ZERO;
            if has_baseline && m.quantity.is_zero() {
                if !removed.contains(&m.ingredient_id) {
                    removed.push(m.ingredient_id);
                }
            } else if m.quantity > m.base_quantity {
                extras.push(ExtraIngredient {
                    ingredient_id: m.ingredient_id,
                    quantity: m.quantity - m.base_quantity,
                });
            }
        }

        Self {
            modifiers,
            removed_ingredients: removed,
            extra_ingredients: extras,
            halves,
        }
    }

    pub fn is_removed(&self, ingredient_id: &Uuid) -> bool {
        self.removed_ingredients.contains(ingredient_id)
    }

    /// Whether an extra or a modifier names the ingredient
    pub fn references_ingredient(&self, ingredient_id: &Uuid) -> bool {
        self.extra_ingredients
            .iter()
            .any(|e| e.ingredient_id == *ingredient_id)
            || self.modifiers.iter().any(|m| m.ingredient_id == *ingredient_id)
    }

    /// Number of distinct ingredients carried as extras
    pub fn distinct_extra_count(&self) -> usize {
        self.extra_ingredients
            .iter()
            .map(|e| e.ingredient_id)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// The `order_items` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    /// Product name at the time the item was added
    pub product_name: String,
    pub quantity: i32,
    pub notes: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub customization: ItemCustomization,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Model {
    /// Whether the item sells the product, whole or as one half
    pub fn references_product(&self, product_id: &Uuid) -> bool {
        self.product_id == *product_id || self.customization.halves.contains(product_id)
    }
}

impl ActiveModelBehavior for ActiveModel {}
