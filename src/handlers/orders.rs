use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::tenant_context::CurrentTenant;
use crate::errors::ServiceError;
use crate::repositories::OrderWithItems;
use crate::services::order_lifecycle::{AppendItemRequest, OrderTransition, TransitionRequest};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct OrderTotalResponse {
    pub order_id: Uuid,
    pub total: Decimal,
}

/// `POST /orders`
pub async fn create_order(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<(StatusCode, Json<ApiResponse<OrderWithItems>>), ServiceError> {
    let order = state.services.lifecycle.create_order(&tenant).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderWithItems> {
    let order = state.services.lifecycle.get_order(&tenant, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// `POST /orders/:id/items`
pub async fn append_item(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
    Json(request): Json<AppendItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderWithItems>>), ServiceError> {
    let order = state
        .services
        .lifecycle
        .append_item(&tenant, id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// `POST /orders/:id/send-to-kitchen`
pub async fn send_to_kitchen(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderWithItems> {
    let order = state
        .services
        .lifecycle
        .transition(&tenant, id, OrderTransition::SendToKitchen)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// `POST /orders/:id/transitions`
pub async fn transition_order(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<OrderWithItems> {
    let order = state
        .services
        .lifecycle
        .transition(&tenant, id, request.transition)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// `GET /orders/:id/total`
pub async fn order_total(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderTotalResponse> {
    let total = state.services.lifecycle.compute_total(&tenant, id).await?;
    Ok(Json(ApiResponse::success(OrderTotalResponse {
        order_id: id,
        total,
    })))
}
