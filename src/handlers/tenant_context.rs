use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::with_storage_timeout;
use crate::errors::ServiceError;
use crate::tenancy::TenantHandle;
use crate::AppState;

/// Header naming the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant";

/// Resolved tenant of the current request.
///
/// Rejects with `ValidationError` when the header is missing, and with the
/// directory's `TenantNotFound`/`TenantInactive` otherwise.
pub struct CurrentTenant(pub TenantHandle);

fn tenant_slug(parts: &Parts) -> Result<String, ServiceError> {
    let raw = parts
        .headers
        .get(TENANT_HEADER)
        .ok_or_else(|| ServiceError::ValidationError(format!("missing {} header", TENANT_HEADER)))?;
    let slug = raw
        .to_str()
        .map_err(|_| ServiceError::ValidationError(format!("invalid {} header", TENANT_HEADER)))?
        .trim();
    if slug.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "empty {} header",
            TENANT_HEADER
        )));
    }
    Ok(slug.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTenant {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let slug = tenant_slug(parts)?;
        let handle = with_storage_timeout(
            state.config.storage_timeout(),
            "resolve_tenant",
            state.tenancy.open(&slug),
        )
        .await?;
        Ok(Self(handle))
    }
}
