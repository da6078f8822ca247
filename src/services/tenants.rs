use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::entities::tenant::{self, TenantPlan, TenantStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::tenancy::Tenancy;

/// Slugs become part of a store name: lowercase letters, digits and `-`/`_`.
fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let well_formed = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && slug.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    if well_formed {
        Ok(())
    } else {
        let mut err = ValidationError::new("slug");
        err.message = Some(
            "Slug must start with a letter or digit and use only a-z, 0-9, '-' or '_'".into(),
        );
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterTenantRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    #[validate(
        length(min = 1, max = 48, message = "Slug must be between 1 and 48 characters"),
        custom = "validate_slug"
    )]
    pub slug: String,
    #[serde(default)]
    pub plan: TenantPlan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTenantStatusRequest {
    pub status: TenantStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTenantPlanRequest {
    pub plan: TenantPlan,
}

/// Tenant registration and administration against the shared directory.
#[derive(Clone)]
pub struct TenantService {
    tenancy: Tenancy,
    event_sender: Option<Arc<EventSender>>,
}

impl TenantService {
    pub fn new(tenancy: Tenancy, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            tenancy,
            event_sender,
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    /// Registers an active tenant and opens its store.
    ///
    /// The directory row is the registration. A store that fails to open
    /// here is opened again lazily on the tenant's first request.
    #[instrument(skip(self, request), fields(slug = %request.slug))]
    pub async fn register(
        &self,
        request: RegisterTenantRequest,
    ) -> Result<tenant::Model, ServiceError> {
        let request = RegisterTenantRequest {
            name: request.name.trim().to_string(),
            slug: request.slug.trim().to_string(),
            plan: request.plan,
        };
        request.validate()?;

        let created = self
            .tenancy
            .directory
            .insert(&request.name, &request.slug, request.plan)
            .await?;

        if let Err(e) = self
            .tenancy
            .registry
            .get_connection(&created.storage_location)
            .await
        {
            warn!(
                storage_location = %created.storage_location,
                error = %e,
                "Tenant store could not be opened at registration"
            );
        }

        self.publish(Event::TenantRegistered {
            slug: created.slug.clone(),
            storage_location: created.storage_location.clone(),
        })
        .await;
        Ok(created)
    }

    pub async fn get(&self, slug: &str) -> Result<tenant::Model, ServiceError> {
        self.tenancy.directory.get(slug).await
    }

    pub async fn list(&self) -> Result<Vec<tenant::Model>, ServiceError> {
        self.tenancy.directory.list().await
    }

    /// Activates or deactivates a tenant. Deactivation drops its cached store handle.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        slug: &str,
        status: TenantStatus,
    ) -> Result<tenant::Model, ServiceError> {
        let updated = self.tenancy.directory.set_status(slug, status).await?;
        if status == TenantStatus::Inactive && self.tenancy.registry.evict(&updated.storage_location)
        {
            info!(slug, "Evicted store handle of deactivated tenant");
        }

        self.publish(Event::TenantStatusChanged {
            slug: updated.slug.clone(),
            status,
        })
        .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn set_plan(&self, slug: &str, plan: TenantPlan) -> Result<tenant::Model, ServiceError> {
        let updated = self.tenancy.directory.set_plan(slug, plan).await?;
        info!(slug, plan = %plan, "Tenant plan changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pizzeria-roma", true)]
    #[case("bar_22", true)]
    #[case("9lives", true)]
    #[case("Roma", false)]
    #[case("-roma", false)]
    #[case("ro ma", false)]
    #[case("roma/../x", false)]
    fn slug_rules(#[case] slug: &str, #[case] ok: bool) {
        assert_eq!(validate_slug(slug).is_ok(), ok);
    }

    #[test]
    fn register_request_defaults_to_basic_plan() {
        let req: RegisterTenantRequest =
            serde_json::from_str(r#"{"name":"Roma","slug":"roma"}"#).unwrap();
        assert_eq!(req.plan, TenantPlan::Basic);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        let req = RegisterTenantRequest {
            name: String::new(),
            slug: "roma".into(),
            plan: TenantPlan::Basic,
        };
        assert!(req.validate().is_err());
    }
}
