use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::tenant_context::CurrentTenant;
use crate::entities::ingredient;
use crate::errors::ServiceError;
use crate::services::ingredients::{CreateIngredientRequest, UpdateIngredientRequest};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_ingredients(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> ApiResult<Vec<ingredient::Model>> {
    let items = state.services.ingredients.list(&tenant).await?;
    Ok(Json(ApiResponse::success(items)))
}

pub async fn low_stock(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> ApiResult<Vec<ingredient::Model>> {
    let items = state.services.ingredients.low_stock(&tenant).await?;
    Ok(Json(ApiResponse::success(items)))
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Json(request): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ingredient::Model>>), ServiceError> {
    let created = state.services.ingredients.create(&tenant, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<ingredient::Model> {
    let found = state.services.ingredients.get(&tenant, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn update_ingredient(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateIngredientRequest>,
) -> ApiResult<ingredient::Model> {
    let updated = state.services.ingredients.update(&tenant, id, request).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_ingredient(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.ingredients.delete(&tenant, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
