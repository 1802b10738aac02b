//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::{handlers, state::AppState};

/// 构建渠道 webhook 路由
///
/// 渠道标签作为路径参数，由结算协调器解析；未注册的渠道返回 404
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route(
        "/webhooks/payments/{provider}",
        post(handlers::webhook::payment_webhook),
    )
}

/// 构建支付意向路由
pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/payments/intents", post(handlers::payment::create_intent))
}

/// 构建订单状态迁移路由
///
/// 管理端迁移（rank 严格递增）与用户取消（仅待支付阶段）
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/status", patch(handlers::order::admin_transition))
        .route("/orders/{id}/cancel", post(handlers::order::cancel_order))
}

/// 构建健康检查路由
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// 构建完整的 API 路由
///
/// 返回所有路由（不含中间件层，由 main.rs 统一挂载）
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(webhook_routes())
        .merge(payment_routes())
        .merge(order_routes())
        .merge(health_routes())
}
