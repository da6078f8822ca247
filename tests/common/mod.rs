#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use comanda_api::{
    config::AppConfig,
    db,
    entities::{
        ingredient::{self, IngredientUnit},
        product::ProductType,
    },
    events::{self, EventSender},
    handlers::tenant_context::TENANT_HEADER,
    repositories::product_repository::RecipeLine,
    services::{
        ingredients::CreateIngredientRequest,
        products::CreateProductRequest,
        tenants::RegisterTenantRequest,
    },
    tenancy::{Tenancy, TenantConnectionRegistry, TenantDirectory, TenantHandle},
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TENANT_SLUG: &str = "trattoria";

/// Seeded catalog of the default tenant.
pub struct Catalog {
    pub flour: ingredient::Model,
    pub cheese: ingredient::Model,
    pub basil: ingredient::Model,
    /// COMPOSED: flour 200, cheese 100; allows halves and extras
    pub pizza: Uuid,
    /// COMPOSED: flour 150, basil 10
    pub focaccia: Uuid,
    /// SIMPLE
    pub soda: Uuid,
}

/// Application state backed by file SQLite stores in a temporary directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub tenant: TenantHandle,
    pub catalog: Catalog,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path().display().to_string();

        let mut cfg = AppConfig::new(
            format!("sqlite://{root}/directory.db?mode=rwc"),
            format!("sqlite://{root}/{{db_name}}.db?mode=rwc"),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        let cfg = Arc::new(cfg);

        let directory_db = db::establish_connection_with_config(&db::DbConfig::from(cfg.as_ref()))
            .await
            .expect("directory connection");
        db::run_directory_migrations(&directory_db)
            .await
            .expect("directory migrations");

        let registry = Arc::new(TenantConnectionRegistry::from_config(cfg.clone()));
        let tenancy = Tenancy::new(TenantDirectory::new(directory_db), registry);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(cfg, tenancy, EventSender::new(event_tx));

        state
            .services
            .tenants
            .register(RegisterTenantRequest {
                name: "Trattoria".to_string(),
                slug: TENANT_SLUG.to_string(),
                plan: Default::default(),
            })
            .await
            .expect("register tenant");
        let tenant = state.tenancy.open(TENANT_SLUG).await.expect("open tenant");

        let catalog = seed_catalog(&state, &tenant).await;

        Self {
            router: comanda_api::app_router(state.clone()),
            state,
            tenant,
            catalog,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub async fn stock_of(&self, id: Uuid) -> Decimal {
        self.state
            .services
            .ingredients
            .get(&self.tenant, id)
            .await
            .expect("ingredient")
            .stock
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        tenant: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(slug) = tenant {
            builder = builder.header(TENANT_HEADER, slug);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, json)
    }

    /// Request against the default tenant.
    pub async fn tenant_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request(method, path, Some(TENANT_SLUG), body).await
    }
}

async fn seed_catalog(state: &AppState, tenant: &TenantHandle) -> Catalog {
    let ingredients = &state.services.ingredients;
    let seed = |name: &str, unit, stock, min_stock| CreateIngredientRequest {
        name: name.to_string(),
        unit,
        stock,
        min_stock,
    };

    let flour = ingredients
        .create(tenant, seed("flour", IngredientUnit::Gram, dec!(1000), dec!(100)))
        .await
        .expect("seed flour");
    let cheese = ingredients
        .create(tenant, seed("cheese", IngredientUnit::Gram, dec!(500), dec!(50)))
        .await
        .expect("seed cheese");
    let basil = ingredients
        .create(tenant, seed("basil", IngredientUnit::Gram, dec!(100), dec!(0)))
        .await
        .expect("seed basil");

    let products = &state.services.products;
    let pizza = products
        .create(
            tenant,
            CreateProductRequest {
                name: "Margherita".to_string(),
                price: dec!(1000),
                category: Some("pizza".to_string()),
                product_type: ProductType::Composed,
                allows_half: true,
                allows_extras: true,
                ingredients: vec![
                    RecipeLine {
                        ingredient_id: flour.id,
                        quantity: dec!(200),
                    },
                    RecipeLine {
                        ingredient_id: cheese.id,
                        quantity: dec!(100),
                    },
                ],
            },
        )
        .await
        .expect("seed pizza");
    let focaccia = products
        .create(
            tenant,
            CreateProductRequest {
                name: "Focaccia".to_string(),
                price: dec!(800),
                category: Some("pizza".to_string()),
                product_type: ProductType::Composed,
                allows_half: true,
                allows_extras: true,
                ingredients: vec![
                    RecipeLine {
                        ingredient_id: flour.id,
                        quantity: dec!(150),
                    },
                    RecipeLine {
                        ingredient_id: basil.id,
                        quantity: dec!(10),
                    },
                ],
            },
        )
        .await
        .expect("seed focaccia");
    let soda = products
        .create(
            tenant,
            CreateProductRequest {
                name: "Soda".to_string(),
                price: dec!(300),
                category: Some("drinks".to_string()),
                product_type: ProductType::Simple,
                allows_half: false,
                allows_extras: false,
                ingredients: Vec::new(),
            },
        )
        .await
        .expect("seed soda");

    Catalog {
        flour,
        cheese,
        basil,
        pizza: pizza.product.id,
        focaccia: focaccia.product.id,
        soda: soda.product.id,
    }
}
