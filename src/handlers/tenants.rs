use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::entities::tenant;
use crate::errors::ServiceError;
use crate::services::tenants::{RegisterTenantRequest, SetTenantPlanRequest, SetTenantStatusRequest};
use crate::{ApiResponse, ApiResult, AppState};

/// `POST /tenants`: not tenant-scoped, so no `x-tenant` header.
pub async fn register_tenant(
    State(state): State<AppState>,
    Json(request): Json<RegisterTenantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<tenant::Model>>), ServiceError> {
    let created = state.services.tenants.register(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Vec<tenant::Model>> {
    let tenants = state.services.tenants.list().await?;
    Ok(Json(ApiResponse::success(tenants)))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<tenant::Model> {
    let found = state.services.tenants.get(&slug).await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn set_tenant_status(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<SetTenantStatusRequest>,
) -> ApiResult<tenant::Model> {
    let updated = state
        .services
        .tenants
        .set_status(&slug, request.status)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn set_tenant_plan(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<SetTenantPlanRequest>,
) -> ApiResult<tenant::Model> {
    let updated = state.services.tenants.set_plan(&slug, request.plan).await?;
    Ok(Json(ApiResponse::success(updated)))
}
