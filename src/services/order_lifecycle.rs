use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::{with_storage_timeout, with_transaction};
use crate::entities::order::{ConsumptionSnapshot, OrderStatus};
use crate::entities::order_item::{ExtraIngredient, ItemCustomization, Modifier};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::order_repository::NewOrderItem;
use crate::repositories::{IngredientRepository, OrderRepository, OrderWithItems, ProductRepository};
use crate::services::billing::BillingCalculator;
use crate::services::inventory_consumption::{self, ConsumptionOutcome};
use crate::tenancy::TenantHandle;

/// A transition requested against an order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderTransition {
    /// DRAFT to SENT_TO_KITCHEN, consuming inventory
    SendToKitchen,
    /// One kitchen step forward: SENT_TO_KITCHEN to IN_PROGRESS, IN_PROGRESS to READY
    Advance,
    StartPreparing,
    MarkReady,
    Void,
}

impl OrderTransition {
    /// Status this transition leads to from `current`, if it is allowed there.
    pub fn target_from(&self, current: OrderStatus) -> Option<OrderStatus> {
        use OrderStatus::*;
        match (self, current) {
            (Self::SendToKitchen, Draft) => Some(SentToKitchen),
            (Self::Advance, SentToKitchen) | (Self::StartPreparing, SentToKitchen) => {
                Some(InProgress)
            }
            (Self::Advance, InProgress) | (Self::MarkReady, InProgress) => Some(Ready),
            (Self::Void, SentToKitchen) | (Self::Void, InProgress) => Some(Voided),
            _ => None,
        }
    }

    /// Transition the kitchen board means when it asks for `target`.
    pub fn for_board_status(target: OrderStatus) -> Result<Self, ServiceError> {
        match target {
            OrderStatus::InProgress => Ok(Self::StartPreparing),
            OrderStatus::Ready => Ok(Self::MarkReady),
            OrderStatus::Voided => Ok(Self::Void),
            other => Err(ServiceError::ValidationError(format!(
                "the kitchen board cannot move an order to {}",
                other
            ))),
        }
    }

    fn label(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub transition: OrderTransition,
}

/// Item to append to a draft order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppendItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub removed_ingredients: Vec<Uuid>,
    #[serde(default)]
    pub extra_ingredients: Vec<ExtraIngredient>,
    /// Two products for a half/half item
    #[serde(default)]
    pub halves: Vec<Uuid>,
}

impl AppendItemRequest {
    fn check_customization(&self) -> Result<(), ServiceError> {
        if !self.modifiers.is_empty()
            && (!self.removed_ingredients.is_empty() || !self.extra_ingredients.is_empty())
        {
            return Err(ServiceError::ValidationError(
                "modifiers cannot be combined with removed or extra ingredient lists".to_string(),
            ));
        }
        if let Some(m) = self.modifiers.iter().find(|m| m.quantity.is_sign_negative()) {
            return Err(ServiceError::ValidationError(format!(
                "modifier quantity for ingredient {} must not be negative",
                m.ingredient_id
            )));
        }
        if let Some(e) = self
            .extra_ingredients
            .iter()
            .find(|e| e.quantity <= Decimal::ZERO)
        {
            return Err(ServiceError::ValidationError(format!(
                "extra quantity for ingredient {} must be positive",
                e.ingredient_id
            )));
        }
        if !self.halves.is_empty() && self.halves.len() != 2 {
            return Err(ServiceError::ValidationError(
                "a half/half item takes exactly two products".to_string(),
            ));
        }
        Ok(())
    }
}

/// Guarded order transitions over one tenant's store.
///
/// Every status change is a compare-and-set on the current status, so
/// concurrent attempts on the same order linearize in the store. Sending to
/// the kitchen and consuming inventory commit or roll back together.
#[derive(Clone)]
pub struct OrderLifecycle {
    billing: BillingCalculator,
    event_sender: Option<Arc<EventSender>>,
    storage_timeout: Duration,
}

impl OrderLifecycle {
    pub fn new(
        billing: BillingCalculator,
        event_sender: Option<Arc<EventSender>>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            billing,
            event_sender,
            storage_timeout,
        }
    }

    pub fn billing(&self) -> BillingCalculator {
        self.billing
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn create_order(&self, tenant: &TenantHandle) -> Result<OrderWithItems, ServiceError> {
        let order = with_storage_timeout(self.storage_timeout, "create_order", async {
            OrderRepository::new(&tenant.db).insert_draft().await
        })
        .await?;

        info!(order_id = %order.id, "Order created");
        self.publish(Event::OrderCreated {
            tenant: tenant.slug().to_string(),
            order_id: order.id,
        })
        .await;

        Ok(OrderWithItems {
            order,
            items: Vec::new(),
        })
    }

    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn get_order(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        with_storage_timeout(self.storage_timeout, "get_order", async {
            OrderRepository::new(&tenant.db).get_with_items(order_id).await
        })
        .await
    }

    /// Appends an item to a DRAFT order. No inventory is touched.
    #[instrument(skip(self, tenant, request), fields(tenant = %tenant.slug(), product_id = %request.product_id))]
    pub async fn append_item(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
        request: AppendItemRequest,
    ) -> Result<OrderWithItems, ServiceError> {
        request.validate()?;
        request.check_customization()?;

        let (order, item_id) = with_storage_timeout(self.storage_timeout, "append_item", async move {
            let new_item = prepare_item(&tenant.db, request).await?;
            with_transaction(&tenant.db, move |txn| {
                Box::pin(async move {
                    let orders = OrderRepository::new(txn);
                    if !orders.touch_if_draft(order_id).await? {
                        return Err(explain_rejection(&orders, order_id, "append items to").await);
                    }
                    let item = orders.insert_item(order_id, new_item).await?;
                    let order = orders.get_with_items(order_id).await?;
                    Ok((order, item.id))
                })
            })
            .await
        })
        .await?;

        info!(order_id = %order_id, item_id = %item_id, "Item appended");
        self.publish(Event::OrderItemAppended {
            tenant: tenant.slug().to_string(),
            order_id,
            item_id,
        })
        .await;

        Ok(order)
    }

    /// Applies `transition` to the order.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug(), transition = %transition))]
    pub async fn transition(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
        transition: OrderTransition,
    ) -> Result<OrderWithItems, ServiceError> {
        let result = if transition == OrderTransition::SendToKitchen {
            self.send_to_kitchen(tenant, order_id).await
        } else {
            self.kitchen_step(tenant, order_id, transition).await
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ServiceError::InvalidOrderState(_)) => "rejected",
            Err(_) => "failed",
        };
        counter!(
            "comanda.order.transition",
            1,
            "transition" => transition.label(),
            "outcome" => outcome
        );
        result
    }

    /// DRAFT to SENT_TO_KITCHEN.
    ///
    /// The guarded status write, the `inventory_discounted` flag, every
    /// ledger decrement and the consumption snapshot share one transaction.
    /// Only the caller that wins the guard consumes inventory.
    async fn send_to_kitchen(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let (order, consumption) =
            with_storage_timeout(self.storage_timeout, "send_to_kitchen", async {
                with_transaction(&tenant.db, move |txn| {
                    Box::pin(async move {
                        let orders = OrderRepository::new(txn);
                        if !orders.claim_for_kitchen(order_id).await? {
                            return Err(
                                explain_rejection(&orders, order_id, "send to kitchen").await
                            );
                        }
                        let items = orders.items(order_id).await?;
                        let consumption = inventory_consumption::consume(txn, &items).await?;
                        orders
                            .set_consumption(
                                order_id,
                                ConsumptionSnapshot::from(&consumption.deltas),
                            )
                            .await?;
                        let order = orders.get_with_items(order_id).await?;
                        Ok((order, consumption))
                    })
                })
                .await
            })
            .await?;

        info!(
            order_id = %order_id,
            ingredients = consumption.deltas.len(),
            "Order sent to kitchen"
        );
        self.announce_consumption(tenant, order_id, consumption).await;
        self.publish(Event::OrderStatusChanged {
            tenant: tenant.slug().to_string(),
            order_id,
            old_status: OrderStatus::Draft,
            new_status: OrderStatus::SentToKitchen,
        })
        .await;

        Ok(order)
    }

    async fn announce_consumption(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
        consumption: ConsumptionOutcome,
    ) {
        self.publish(Event::InventoryConsumed {
            tenant: tenant.slug().to_string(),
            order_id,
            ingredients: consumption.deltas.len(),
        })
        .await;
        for ingredient in consumption.below_minimum {
            warn!(
                ingredient_id = %ingredient.id,
                stock = %ingredient.stock,
                min_stock = %ingredient.min_stock,
                "Ingredient below minimum stock"
            );
            self.publish(Event::StockBelowMinimum {
                tenant: tenant.slug().to_string(),
                ingredient_id: ingredient.id,
                name: ingredient.name,
                stock: ingredient.stock,
                min_stock: ingredient.min_stock,
            })
            .await;
        }
    }

    /// Kitchen-side transitions: advance, start, ready and void.
    ///
    /// The target is derived from the status observed first; the write is
    /// guarded on that same status so a concurrent change makes it lose.
    /// Reaching READY bills the order in the same transaction.
    async fn kitchen_step(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
        transition: OrderTransition,
    ) -> Result<OrderWithItems, ServiceError> {
        let billing = self.billing;
        let (current, target, order) =
            with_storage_timeout(self.storage_timeout, "order_transition", async {
                let current = OrderRepository::new(&tenant.db)
                    .status_of(order_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
                let target = transition.target_from(current).ok_or_else(|| {
                    ServiceError::InvalidOrderState(format!(
                        "cannot {} order {} in status {}",
                        transition, order_id, current
                    ))
                })?;

                let order = with_transaction(&tenant.db, move |txn| {
                    Box::pin(async move {
                        let orders = OrderRepository::new(txn);
                        if !orders
                            .compare_and_set_status(order_id, &[current], target)
                            .await?
                        {
                            return Err(
                                explain_rejection(&orders, order_id, transition.label()).await
                            );
                        }
                        if target == OrderStatus::Ready {
                            let total = billing.total(txn, order_id).await?;
                            orders.set_total(order_id, total).await?;
                        }
                        orders.get_with_items(order_id).await
                    })
                })
                .await?;
                Ok((current, target, order))
            })
            .await?;

        info!(order_id = %order_id, from = %current, to = %target, "Order status changed");
        self.publish(Event::OrderStatusChanged {
            tenant: tenant.slug().to_string(),
            order_id,
            old_status: current,
            new_status: target,
        })
        .await;

        Ok(order)
    }

    /// Legacy kitchen board: moves the order to a named status.
    pub async fn set_board_status(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderWithItems, ServiceError> {
        let transition = OrderTransition::for_board_status(target)?;
        self.transition(tenant, order_id, transition).await
    }

    /// The total persisted on READY, else the current total from catalog
    /// prices. Read-only.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn compute_total(
        &self,
        tenant: &TenantHandle,
        order_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        with_storage_timeout(self.storage_timeout, "compute_total", async {
            let order = OrderRepository::new(&tenant.db).get(order_id).await?;
            match order.total {
                Some(total) => Ok(total),
                None => self.billing.total(&tenant.db, order_id).await,
            }
        })
        .await
    }

    /// Every order past DRAFT, oldest first.
    #[instrument(skip(self, tenant), fields(tenant = %tenant.slug()))]
    pub async fn list_kitchen_orders(
        &self,
        tenant: &TenantHandle,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        with_storage_timeout(self.storage_timeout, "list_kitchen_orders", async {
            OrderRepository::new(&tenant.db).list_kitchen().await
        })
        .await
    }
}

/// Turns a lost compare-and-set into `NotFound` or `InvalidOrderState`.
async fn explain_rejection<C: ConnectionTrait>(
    orders: &OrderRepository<'_, C>,
    order_id: Uuid,
    action: &str,
) -> ServiceError {
    match orders.status_of(order_id).await {
        Ok(None) => ServiceError::NotFound(format!("Order {} not found", order_id)),
        Ok(Some(status)) => ServiceError::InvalidOrderState(format!(
            "cannot {} order {} in status {}",
            action, order_id, status
        )),
        Err(e) => e,
    }
}

/// Checks the item against the catalog and snapshots the product name.
async fn prepare_item<C: ConnectionTrait>(
    db: &C,
    request: AppendItemRequest,
) -> Result<NewOrderItem, ServiceError> {
    let products = ProductRepository::new(db);
    let product = products
        .find_by_id(request.product_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", request.product_id)))?;

    if !request.halves.is_empty() {
        if !product.allows_half {
            return Err(ServiceError::ValidationError(format!(
                "product '{}' cannot be sold by halves",
                product.name
            )));
        }
        let found = products.find_many_with_recipes(&request.halves).await?;
        if let Some(missing) = request.halves.iter().find(|id| !found.contains_key(id)) {
            return Err(ServiceError::NotFound(format!("Product {} not found", missing)));
        }
    }

    let customization = ItemCustomization::new(
        request.modifiers,
        request.removed_ingredients,
        request.extra_ingredients,
        request.halves,
    );

    if !customization.extra_ingredients.is_empty() && !product.allows_extras {
        return Err(ServiceError::ValidationError(format!(
            "product '{}' does not take extra ingredients",
            product.name
        )));
    }

    let referenced: BTreeSet<Uuid> = customization
        .extra_ingredients
        .iter()
        .map(|e| e.ingredient_id)
        .chain(customization.modifiers.iter().map(|m| m.ingredient_id))
        .collect();
    if !referenced.is_empty() {
        let ids: Vec<Uuid> = referenced.iter().copied().collect();
        let known: BTreeSet<Uuid> = IngredientRepository::new(db)
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        if let Some(missing) = referenced.difference(&known).next() {
            return Err(ServiceError::NotFound(format!("Ingredient {} not found", missing)));
        }
    }

    Ok(NewOrderItem {
        product_id: product.id,
        product_name: product.name,
        quantity: request.quantity,
        notes: request.notes,
        customization,
    })
}
