use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::tenant::TenantStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Domain events published by the core operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TenantRegistered {
        slug: String,
        storage_location: String,
    },
    TenantStatusChanged {
        slug: String,
        status: TenantStatus,
    },
    OrderCreated {
        tenant: String,
        order_id: Uuid,
    },
    OrderItemAppended {
        tenant: String,
        order_id: Uuid,
        item_id: Uuid,
    },
    OrderStatusChanged {
        tenant: String,
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    InventoryConsumed {
        tenant: String,
        order_id: Uuid,
        ingredients: usize,
    },
    StockBelowMinimum {
        tenant: String,
        ingredient_id: Uuid,
        name: String,
        stock: Decimal,
        min_stock: Decimal,
    },
}

/// Drains the event channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockBelowMinimum {
                tenant,
                ingredient_id,
                name,
                stock,
                min_stock,
            } => {
                warn!(
                    tenant = %tenant,
                    ingredient_id = %ingredient_id,
                    stock = %stock,
                    min_stock = %min_stock,
                    "Ingredient {} is below its minimum stock",
                    name
                );
            }
            Event::OrderStatusChanged {
                tenant,
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    tenant = %tenant,
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "Order status changed"
                );
            }
            other => info!(event = ?other, "Domain event"),
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated {
                tenant: "acme".into(),
                order_id,
            })
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Event::OrderCreated {
                tenant: "acme".into(),
                order_id
            })
        );
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::TenantRegistered {
                slug: "acme".into(),
                storage_location: "acme_pos_db".into(),
            })
            .await;
        assert!(sender.send(Event::OrderCreated {
            tenant: "acme".into(),
            order_id: Uuid::new_v4(),
        })
        .await
        .is_err());
    }
}
