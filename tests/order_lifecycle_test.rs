//! End-to-end order lifecycle against real tenant stores.
//!
//! Covers the kitchen send with its inventory consumption, the guarded
//! status progression, billing on READY and voiding.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use comanda_api::{
    entities::{
        ingredient::{self, IngredientUnit},
        order::OrderStatus,
        order_item::{ExtraIngredient, Modifier},
    },
    errors::ServiceError,
    services::{AppendItemRequest, OrderTransition},
};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

fn item(product_id: Uuid, quantity: i32) -> AppendItemRequest {
    AppendItemRequest {
        product_id,
        quantity,
        ..Default::default()
    }
}

async fn draft_with(app: &TestApp, items: Vec<AppendItemRequest>) -> Uuid {
    let lifecycle = &app.state.services.lifecycle;
    let order = lifecycle.create_order(&app.tenant).await.expect("create order");
    for request in items {
        lifecycle
            .append_item(&app.tenant, order.order.id, request)
            .await
            .expect("append item");
    }
    order.order.id
}

#[tokio::test]
async fn new_order_starts_as_empty_draft() {
    let app = TestApp::new().await;
    let order = app
        .state
        .services
        .lifecycle
        .create_order(&app.tenant)
        .await
        .expect("create order");

    assert_eq!(order.order.status, OrderStatus::Draft);
    assert!(!order.order.inventory_discounted);
    assert!(order.order.total.is_none());
    assert!(order.items.is_empty());
}

#[tokio::test]
async fn send_to_kitchen_consumes_recipe_once() {
    let app = TestApp::new().await;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 2)]).await;

    let sent = app
        .state
        .services
        .lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send to kitchen");

    assert_eq!(sent.order.status, OrderStatus::SentToKitchen);
    assert!(sent.order.inventory_discounted);
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(600));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(300));
    assert_eq!(app.stock_of(app.catalog.basil.id).await, dec!(100));

    let snapshot = sent.order.consumption.expect("consumption snapshot");
    assert_eq!(snapshot.deltas.len(), 2);
    let flour = snapshot
        .deltas
        .iter()
        .find(|d| d.ingredient_id == app.catalog.flour.id)
        .expect("flour delta");
    assert_eq!(flour.quantity, dec!(-400));
}

#[tokio::test]
async fn second_send_is_rejected_without_touching_stock() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 1)]).await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("first send");
    let second = lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await;

    assert_matches!(second, Err(ServiceError::InvalidOrderState(_)));
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(800));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(400));
}

#[tokio::test]
async fn concurrent_sends_consume_exactly_once() {
    let app = TestApp::new().await;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 1)]).await;
    let lifecycle = Arc::clone(&app.state.services.lifecycle);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lifecycle = Arc::clone(&lifecycle);
        let tenant = app.tenant.clone();
        tasks.push(tokio::spawn(async move {
            lifecycle
                .transition(&tenant, order_id, OrderTransition::SendToKitchen)
                .await
        }));
    }

    let mut sent = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(_) => sent += 1,
            Err(e) => assert_matches!(e, ServiceError::InvalidOrderState(_)),
        }
    }

    assert_eq!(sent, 1, "exactly one send should win; got {}", sent);
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(800));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(400));
}

#[tokio::test]
async fn progression_to_ready_persists_total() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(
        &app,
        vec![
            item(app.catalog.pizza, 2),
            AppendItemRequest {
                extra_ingredients: vec![ExtraIngredient {
                    ingredient_id: app.catalog.cheese.id,
                    quantity: dec!(50),
                }],
                ..item(app.catalog.pizza, 1)
            },
            item(app.catalog.soda, 3),
        ],
    )
    .await;

    for (transition, expected) in [
        (OrderTransition::SendToKitchen, OrderStatus::SentToKitchen),
        (OrderTransition::Advance, OrderStatus::InProgress),
        (OrderTransition::Advance, OrderStatus::Ready),
    ] {
        let order = lifecycle
            .transition(&app.tenant, order_id, transition)
            .await
            .expect("transition");
        assert_eq!(order.order.status, expected);
    }

    let surcharge = lifecycle.billing().extra_surcharge();
    let expected = dec!(2000) + dec!(1000) + surcharge + dec!(900);
    let order = lifecycle.get_order(&app.tenant, order_id).await.expect("order");
    assert_eq!(order.order.total, Some(expected));
    assert_eq!(
        lifecycle
            .compute_total(&app.tenant, order_id)
            .await
            .expect("total"),
        expected
    );
}

#[tokio::test]
async fn ready_is_terminal() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.soda, 1)]).await;

    for transition in [
        OrderTransition::SendToKitchen,
        OrderTransition::StartPreparing,
        OrderTransition::MarkReady,
    ] {
        lifecycle
            .transition(&app.tenant, order_id, transition)
            .await
            .expect("transition");
    }

    for transition in [
        OrderTransition::Advance,
        OrderTransition::Void,
        OrderTransition::SendToKitchen,
    ] {
        assert_matches!(
            lifecycle.transition(&app.tenant, order_id, transition).await,
            Err(ServiceError::InvalidOrderState(_))
        );
    }
}

#[tokio::test]
async fn void_after_kitchen_keeps_consumed_stock() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 1)]).await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send");
    let voided = lifecycle
        .transition(&app.tenant, order_id, OrderTransition::Void)
        .await
        .expect("void");

    assert_eq!(voided.order.status, OrderStatus::Voided);
    assert!(voided.order.total.is_none());
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(800));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(400));
}

#[tokio::test]
async fn drafts_cannot_be_voided_or_advanced() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 1)]).await;

    for transition in [OrderTransition::Void, OrderTransition::Advance] {
        assert_matches!(
            lifecycle.transition(&app.tenant, order_id, transition).await,
            Err(ServiceError::InvalidOrderState(_))
        );
    }

    let order = lifecycle.get_order(&app.tenant, order_id).await.expect("order");
    assert_eq!(order.order.status, OrderStatus::Draft);
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(1000));
}

#[tokio::test]
async fn stock_may_go_negative() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 6)]).await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send despite shortage");

    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(-200));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(-100));

    let low: Vec<Uuid> = app
        .state
        .services
        .ingredients
        .low_stock(&app.tenant)
        .await
        .expect("low stock")
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert!(low.contains(&app.catalog.flour.id));
    assert!(low.contains(&app.catalog.cheese.id));
    assert!(!low.contains(&app.catalog.basil.id));
}

#[tokio::test]
async fn removals_extras_and_halves_shape_consumption() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(
        &app,
        vec![
            // No cheese, extra basil once
            AppendItemRequest {
                removed_ingredients: vec![app.catalog.cheese.id],
                extra_ingredients: vec![ExtraIngredient {
                    ingredient_id: app.catalog.basil.id,
                    quantity: dec!(5),
                }],
                ..item(app.catalog.pizza, 2)
            },
            // Half margherita, half focaccia
            AppendItemRequest {
                halves: vec![app.catalog.pizza, app.catalog.focaccia],
                ..item(app.catalog.pizza, 1)
            },
        ],
    )
    .await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send");

    // flour: 200×2 + 200 + 150
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(250));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(400));
    // basil: 5 extra + 10 from the focaccia half
    assert_eq!(app.stock_of(app.catalog.basil.id).await, dec!(85));
}

#[tokio::test]
async fn modifiers_derive_extras_and_removals() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(
        &app,
        vec![AppendItemRequest {
            modifiers: vec![
                Modifier {
                    ingredient_id: app.catalog.cheese.id,
                    name: "cheese".to_string(),
                    base_quantity: dec!(100),
                    quantity: dec!(160),
                    is_extra: false,
                },
                Modifier {
                    ingredient_id: app.catalog.flour.id,
                    name: "flour".to_string(),
                    base_quantity: dec!(200),
                    quantity: dec!(0),
                    is_extra: false,
                },
            ],
            ..item(app.catalog.pizza, 1)
        }],
    )
    .await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send");

    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(1000));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(340));
}

#[tokio::test]
async fn failed_consumption_leaves_the_draft_untouched() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;

    // Sorts after every other ingredient, so earlier deltas apply first
    let olives = Uuid::from_u128(u128::MAX);
    let now = Utc::now();
    ingredient::ActiveModel {
        id: Set(olives),
        name: Set("olives".to_string()),
        unit: Set(IngredientUnit::Unit),
        stock: Set(dec!(200)),
        min_stock: Set(dec!(0)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&app.tenant.db)
    .await
    .expect("insert olives");

    let order_id = draft_with(
        &app,
        vec![AppendItemRequest {
            extra_ingredients: vec![ExtraIngredient {
                ingredient_id: olives,
                quantity: dec!(30),
            }],
            ..item(app.catalog.pizza, 2)
        }],
    )
    .await;

    // Removed behind the service's back, as a concurrent writer could
    ingredient::Entity::delete_by_id(olives)
        .exec(&app.tenant.db)
        .await
        .expect("delete olives");

    for _ in 0..2 {
        assert_matches!(
            lifecycle
                .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
                .await,
            Err(ServiceError::InventoryError(_))
        );
    }

    let order = lifecycle.get_order(&app.tenant, order_id).await.expect("order");
    assert_eq!(order.order.status, OrderStatus::Draft);
    assert!(!order.order.inventory_discounted);
    assert!(order.order.consumption.is_none());
    assert_eq!(app.stock_of(app.catalog.flour.id).await, dec!(1000));
    assert_eq!(app.stock_of(app.catalog.cheese.id).await, dec!(500));
}

#[tokio::test]
async fn items_can_only_be_appended_to_drafts() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, vec![item(app.catalog.pizza, 1)]).await;

    lifecycle
        .transition(&app.tenant, order_id, OrderTransition::SendToKitchen)
        .await
        .expect("send");

    assert_matches!(
        lifecycle
            .append_item(&app.tenant, order_id, item(app.catalog.soda, 1))
            .await,
        Err(ServiceError::InvalidOrderState(_))
    );
    let order = lifecycle.get_order(&app.tenant, order_id).await.expect("order");
    assert_eq!(order.items.len(), 1);
}

#[tokio::test]
async fn append_rejects_unknown_references() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let order_id = draft_with(&app, Vec::new()).await;

    assert_matches!(
        lifecycle
            .append_item(&app.tenant, order_id, item(Uuid::new_v4(), 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        lifecycle
            .append_item(&app.tenant, Uuid::new_v4(), item(app.catalog.pizza, 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        lifecycle
            .append_item(
                &app.tenant,
                order_id,
                AppendItemRequest {
                    extra_ingredients: vec![ExtraIngredient {
                        ingredient_id: Uuid::new_v4(),
                        quantity: dec!(1),
                    }],
                    ..item(app.catalog.pizza, 1)
                },
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    // Soda neither splits nor takes extras
    assert_matches!(
        lifecycle
            .append_item(
                &app.tenant,
                order_id,
                AppendItemRequest {
                    halves: vec![app.catalog.soda, app.catalog.pizza],
                    ..item(app.catalog.soda, 1)
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn kitchen_board_lists_orders_past_draft() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;
    let draft = draft_with(&app, vec![item(app.catalog.soda, 1)]).await;
    let sent = draft_with(&app, vec![item(app.catalog.soda, 1)]).await;

    lifecycle
        .transition(&app.tenant, sent, OrderTransition::SendToKitchen)
        .await
        .expect("send");
    lifecycle
        .set_board_status(&app.tenant, sent, OrderStatus::InProgress)
        .await
        .expect("board status");

    let board: Vec<Uuid> = lifecycle
        .list_kitchen_orders(&app.tenant)
        .await
        .expect("board")
        .into_iter()
        .map(|o| o.order.id)
        .collect();
    assert_eq!(board, vec![sent]);
    assert!(!board.contains(&draft));

    assert_matches!(
        lifecycle
            .set_board_status(&app.tenant, sent, OrderStatus::Draft)
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    assert_matches!(
        app.state
            .services
            .lifecycle
            .transition(&app.tenant, Uuid::new_v4(), OrderTransition::Advance)
            .await,
        Err(ServiceError::NotFound(_))
    );
}
