//! 订单状态迁移 API 处理器

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use crate::error::PaymentError;
use crate::models::{Order, OrderStatus};
use crate::state::AppState;

use super::ApiResponse;

/// 管理端状态迁移请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: OrderStatus,
}

/// 管理端订单状态迁移
///
/// PATCH /orders/{id}/status
///
/// 只接受 rank 严格递增的正向迁移；CANCELED 的 rank 低于一切，
/// 通过此接口永远会被 409 拒绝。
pub async fn admin_transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<Order>>, PaymentError> {
    let order = state.orders.admin_transition(&id, req.status).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// 用户取消订单
///
/// POST /orders/{id}/cancel
///
/// 仅订单仍处于待支付阶段时允许。
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Order>>, PaymentError> {
    let order = state.orders.cancel_by_user(&id).await?;
    Ok(Json(ApiResponse::success(order)))
}
