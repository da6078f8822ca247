use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle status of an order.
///
/// The canonical names are exposed verbatim. The legacy kitchen board names
/// (`COCINA`, `EN_ESPERA`, `EN_PROCESO`, `LISTO`, `ELIMINADO`) parse into the
/// same states and are never written back.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "DRAFT")]
    #[serde(rename = "DRAFT")]
    #[strum(to_string = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "SENT_TO_KITCHEN")]
    #[serde(rename = "SENT_TO_KITCHEN", alias = "COCINA", alias = "EN_ESPERA")]
    #[strum(to_string = "SENT_TO_KITCHEN", serialize = "COCINA", serialize = "EN_ESPERA")]
    SentToKitchen,
    #[sea_orm(string_value = "IN_PROGRESS")]
    #[serde(rename = "IN_PROGRESS", alias = "EN_PROCESO")]
    #[strum(to_string = "IN_PROGRESS", serialize = "EN_PROCESO")]
    InProgress,
    #[sea_orm(string_value = "READY")]
    #[serde(rename = "READY", alias = "LISTO")]
    #[strum(to_string = "READY", serialize = "LISTO")]
    Ready,
    #[sea_orm(string_value = "VOIDED")]
    #[serde(rename = "VOIDED", alias = "ELIMINADO")]
    #[strum(to_string = "VOIDED", serialize = "ELIMINADO")]
    Voided,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Voided)
    }

    /// Whether the order is visible on the kitchen board
    pub fn is_on_kitchen_board(&self) -> bool {
        !matches!(self, Self::Draft)
    }
}

/// Ledger deltas applied when the order was sent to the kitchen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ConsumptionSnapshot {
    pub deltas: Vec<LedgerDelta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub ingredient_id: Uuid,
    /// Negative for a decrement
    pub quantity: Decimal,
}

impl From<&BTreeMap<Uuid, Decimal>> for ConsumptionSnapshot {
    fn from(deltas: &BTreeMap<Uuid, Decimal>) -> Self {
        Self {
            deltas: deltas
                .iter()
                .map(|(ingredient_id, quantity)| LedgerDelta {
                    ingredient_id: *ingredient_id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }
}

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: OrderStatus,
    /// Flips false to true once, together with the kitchen send
    pub inventory_discounted: bool,
    /// Set when the order reaches READY
    #[sea_orm(column_type = "Decimal(Some((14, 2)))", nullable)]
    pub total: Option<Decimal>,
    #[sea_orm(column_type = "Json", nullable)]
    pub consumption: Option<ConsumptionSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
