pub mod health;
pub mod ingredients;
pub mod kitchen;
pub mod orders;
pub mod products;
pub mod tenant_context;
pub mod tenants;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    ingredients::IngredientService, products::ProductService, tenants::TenantService,
    BillingCalculator, OrderLifecycle,
};
use crate::tenancy::Tenancy;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub lifecycle: Arc<OrderLifecycle>,
    pub ingredients: Arc<IngredientService>,
    pub products: Arc<ProductService>,
    pub tenants: Arc<TenantService>,
}

impl AppServices {
    pub fn new(config: &AppConfig, tenancy: Tenancy, event_sender: Arc<EventSender>) -> Self {
        let timeout = config.storage_timeout();
        let billing = BillingCalculator::new(config.extra_ingredient_surcharge);

        Self {
            lifecycle: Arc::new(OrderLifecycle::new(
                billing,
                Some(event_sender.clone()),
                timeout,
            )),
            ingredients: Arc::new(IngredientService::new(timeout)),
            products: Arc::new(ProductService::new(timeout)),
            tenants: Arc::new(TenantService::new(tenancy, Some(event_sender))),
        }
    }
}
