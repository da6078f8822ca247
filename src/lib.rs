//! Comanda API Library
//!
//! Multi-tenant restaurant point-of-sale backend: per-tenant store registry,
//! guarded order lifecycle, recipe-driven inventory consumption and billing.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod repositories;
pub mod services;
pub mod tenancy;
pub mod tracing;

use axum::{
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::tenancy::Tenancy;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tenancy: Tenancy,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, tenancy: Tenancy, event_sender: EventSender) -> Self {
        let event_sender = Arc::new(event_sender);
        let services = AppServices::new(&config, tenancy.clone(), event_sender.clone());
        Self {
            config,
            tenancy,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    let tenants = Router::new()
        .route(
            "/tenants",
            post(handlers::tenants::register_tenant).get(handlers::tenants::list_tenants),
        )
        .route("/tenants/:slug", get(handlers::tenants::get_tenant))
        .route(
            "/tenants/:slug/status",
            put(handlers::tenants::set_tenant_status),
        )
        .route("/tenants/:slug/plan", put(handlers::tenants::set_tenant_plan));

    let ingredients = Router::new()
        .route(
            "/ingredients",
            get(handlers::ingredients::list_ingredients)
                .post(handlers::ingredients::create_ingredient),
        )
        .route("/ingredients/low-stock", get(handlers::ingredients::low_stock))
        .route(
            "/ingredients/:id",
            get(handlers::ingredients::get_ingredient)
                .put(handlers::ingredients::update_ingredient)
                .delete(handlers::ingredients::delete_ingredient),
        );

    let products = Router::new()
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        );

    let orders = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/items", post(handlers::orders::append_item))
        .route(
            "/orders/:id/send-to-kitchen",
            post(handlers::orders::send_to_kitchen),
        )
        .route(
            "/orders/:id/transitions",
            post(handlers::orders::transition_order),
        )
        .route("/orders/:id/total", get(handlers::orders::order_total));

    let kitchen = Router::new()
        .route("/kitchen", get(handlers::kitchen::list_board))
        .route("/kitchen/:id/status", post(handlers::kitchen::set_board_status));

    Router::new()
        .nest("/health", handlers::health::health_routes())
        .merge(tenants)
        .merge(ingredients)
        .merge(products)
        .merge(orders)
        .merge(kitchen)
}

/// Full application router with request ids, HTTP tracing and compression.
/// CORS is left to the caller.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "comanda-api up" }))
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::*;
    pub use crate::tenancy::*;
}
