//! Kitchen board: polls orders past DRAFT and moves them along.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::tenant_context::CurrentTenant;
use crate::entities::order::OrderStatus;
use crate::repositories::OrderWithItems;
use crate::{ApiResponse, ApiResult, AppState};

/// Target status; accepts canonical names and the board's legacy ones
/// (`EN_PROCESO`, `LISTO`, `ELIMINADO`).
#[derive(Debug, Deserialize)]
pub struct BoardStatusRequest {
    pub status: OrderStatus,
}

/// `GET /kitchen`
pub async fn list_board(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> ApiResult<Vec<OrderWithItems>> {
    let orders = state.services.lifecycle.list_kitchen_orders(&tenant).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// `POST /kitchen/:id/status`
pub async fn set_board_status(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
    Json(request): Json<BoardStatusRequest>,
) -> ApiResult<OrderWithItems> {
    let order = state
        .services
        .lifecycle
        .set_board_status(&tenant, id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
