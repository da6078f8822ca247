//! HTTP surface: tenant header handling, error mapping and a full order flow.

mod common;

use std::str::FromStr;

use axum::http::{Method, StatusCode};
use common::{TestApp, TENANT_SLUG};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

#[tokio::test]
async fn health_endpoints_report_up() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = app
        .request(Method::GET, "/api/v1/health/ready", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["directory"]["status"], "up");
    assert!(body["open_tenant_stores"].as_u64().unwrap_or(0) >= 1);
}

#[tokio::test]
async fn tenant_scoped_routes_require_the_header() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/v1/ingredients", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap_or_default().contains("x-tenant"));

    let (status, _) = app
        .request(Method::GET, "/api/v1/ingredients", Some("   "), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::GET, "/api/v1/ingredients", Some("nowhere"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_tenant_is_forbidden() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/tenants/{TENANT_SLUG}/status"),
            None,
            Some(json!({ "status": "inactive" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "inactive");

    let (status, _) = app.tenant_request(Method::GET, "/api/v1/ingredients", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenant_registration_over_http() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/tenants",
            None,
            Some(json!({ "name": "Osteria", "slug": "osteria", "plan": "premium" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["storage_location"], "osteria_pos_db");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/tenants",
            None,
            Some(json!({ "name": "Osteria again", "slug": "osteria" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(Method::GET, "/api/v1/ingredients", Some("osteria"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn full_order_flow_over_http() {
    let app = TestApp::new().await;
    let pizza = app.catalog.pizza.to_string();
    let cheese = app.catalog.cheese.id.to_string();

    let (status, body) = app.tenant_request(Method::POST, "/api/v1/orders", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "DRAFT");
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    let (status, body) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/items"),
            Some(json!({
                "product_id": pizza,
                "quantity": 2,
                "notes": "well done",
                "extra_ingredients": [{ "ingredient_id": cheese, "quantity": "30" }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["items"][0]["product_name"], "Margherita");

    let (status, body) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/send-to-kitchen"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SENT_TO_KITCHEN");
    assert_eq!(body["data"]["inventory_discounted"], true);

    let (status, _) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/send-to-kitchen"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .tenant_request(
            Method::GET,
            &format!("/api/v1/ingredients/{cheese}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    // 100 × 2 from the recipe plus 30 extra once
    assert_eq!(decimal(&body["data"]["stock"]), dec!(270));

    let (status, body) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/transitions"),
            Some(json!({ "transition": "advance" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "IN_PROGRESS");

    // Legacy board name for READY
    let (status, body) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/kitchen/{order_id}/status"),
            Some(json!({ "status": "LISTO" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "READY");

    let surcharge = app.state.services.lifecycle.billing().extra_surcharge();
    let expected = dec!(2000) + surcharge * dec!(2);
    assert_eq!(decimal(&body["data"]["total"]), expected);

    let (status, body) = app
        .tenant_request(Method::GET, &format!("/api/v1/orders/{order_id}/total"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["total"]), expected);

    let (status, body) = app.tenant_request(Method::GET, "/api/v1/kitchen", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn invalid_requests_map_to_client_errors() {
    let app = TestApp::new().await;

    let (_, body) = app.tenant_request(Method::POST, "/api/v1/orders", None).await;
    let order_id = body["data"]["id"].as_str().expect("order id").to_string();

    let (status, _) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/items"),
            Some(json!({ "product_id": app.catalog.pizza, "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .tenant_request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/transitions"),
            Some(json!({ "transition": "advance" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .tenant_request(
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .tenant_request(
            Method::DELETE,
            &format!("/api/v1/ingredients/{}", app.catalog.flour.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn catalog_crud_over_http() {
    let app = TestApp::new().await;
    let flour = app.catalog.flour.id.to_string();

    let (status, body) = app
        .tenant_request(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "name": "Bruschetta",
                "price": "650",
                "product_type": "COMPOSED",
                "ingredients": [{ "ingredient_id": flour, "quantity": "80" }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["product_type"], "COMPOSED");
    assert_eq!(body["data"]["allows_extras"], true);
    let id = body["data"]["id"].as_str().expect("product id").to_string();

    let (status, body) = app
        .tenant_request(
            Method::PUT,
            &format!("/api/v1/products/{id}"),
            Some(json!({ "price": "700" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["price"]), dec!(700));
    assert_eq!(body["data"]["recipe"].as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .tenant_request(Method::DELETE, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .tenant_request(Method::GET, &format!("/api/v1/products/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .tenant_request(Method::GET, "/api/v1/ingredients/low-stock", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}
