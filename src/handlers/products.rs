use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::tenant_context::CurrentTenant;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::repositories::ProductWithRecipe;
use crate::services::products::{CreateProductRequest, UpdateProductRequest};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_products(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> ApiResult<Vec<product::Model>> {
    let products = state.services.products.list(&tenant).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductWithRecipe>>), ServiceError> {
    let created = state.services.products.create(&tenant, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Product with its recipe in entry order
pub async fn get_product(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductWithRecipe> {
    let found = state.services.products.get(&tenant, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<ProductWithRecipe> {
    let updated = state.services.products.update(&tenant, id, request).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.products.delete(&tenant, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
