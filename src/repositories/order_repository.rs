use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::order::{self, ConsumptionSnapshot, Entity as Order, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItem, ItemCustomization};
use crate::errors::ServiceError;

/// An order with its items in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Fields of an item about to be appended.
#[derive(Clone, Debug)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub notes: Option<String>,
    pub customization: ItemCustomization,
}

/// Order aggregate accessor.
///
/// Status changes are compare-and-set updates filtered on the expected
/// current status; callers learn whether they won from the affected row count.
pub struct OrderRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> OrderRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn insert_draft(&self) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let model = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::Draft),
            inventory_discounted: Set(false),
            total: Set(None),
            consumption: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db).await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find_by_id(id).one(self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(self.db)
            .await?)
    }

    pub async fn get_with_items(&self, id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = self.get(id).await?;
        let items = self.items(id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Current status only, used to explain a lost compare-and-set
    pub async fn status_of(&self, id: Uuid) -> Result<Option<OrderStatus>, ServiceError> {
        Ok(Order::find_by_id(id)
            .select_only()
            .column(order::Column::Status)
            .into_tuple::<OrderStatus>()
            .one(self.db)
            .await?)
    }

    /// Moves the order to `to` if its status is one of `from`.
    pub async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, ServiceError> {
        let res = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Status.is_in(from.iter().copied()))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// DRAFT to SENT_TO_KITCHEN and raises `inventory_discounted`, both in
    /// one statement guarded on the flag still being false.
    pub async fn claim_for_kitchen(&self, id: Uuid) -> Result<bool, ServiceError> {
        let res = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::SentToKitchen))
            .col_expr(order::Column::InventoryDiscounted, Expr::value(true))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Status.eq(OrderStatus::Draft))
            .filter(order::Column::InventoryDiscounted.eq(false))
            .exec(self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Bumps `updated_at` while the order is still a draft. Inside a
    /// transaction this takes the row lock before an item is appended.
    pub async fn touch_if_draft(&self, id: Uuid) -> Result<bool, ServiceError> {
        self.compare_and_set_status(id, &[OrderStatus::Draft], OrderStatus::Draft)
            .await
    }

    pub async fn insert_item(
        &self,
        order_id: Uuid,
        item: NewOrderItem,
    ) -> Result<order_item::Model, ServiceError> {
        let position = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .count(self.db)
            .await?;
        let model = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            position: Set(position as i32),
            product_id: Set(item.product_id),
            product_name: Set(item.product_name),
            quantity: Set(item.quantity),
            notes: Set(item.notes),
            customization: Set(item.customization),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db).await?)
    }

    pub async fn set_consumption(
        &self,
        id: Uuid,
        snapshot: ConsumptionSnapshot,
    ) -> Result<(), ServiceError> {
        Order::update_many()
            .col_expr(order::Column::Consumption, Expr::value(Some(snapshot)))
            .filter(order::Column::Id.eq(id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    pub async fn set_total(&self, id: Uuid, total: Decimal) -> Result<(), ServiceError> {
        Order::update_many()
            .col_expr(order::Column::Total, Expr::value(Some(total)))
            .filter(order::Column::Id.eq(id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Items of orders still moving through the kitchen flow.
    pub async fn open_items(&self) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(order::Column::Status.is_in([
                OrderStatus::Draft,
                OrderStatus::SentToKitchen,
                OrderStatus::InProgress,
            ]))
            .all(self.db)
            .await?)
    }

    /// Every order past DRAFT, oldest first
    pub async fn list_kitchen(&self) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::Status.ne(OrderStatus::Draft))
            .order_by_asc(order::Column::CreatedAt)
            .all(self.db)
            .await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::Position)
            .all(self.db)
            .await?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }
}
