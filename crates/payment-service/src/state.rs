//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use sqlx::PgPool;

use storefront_shared::cache::Cache;

use crate::service::{IntentService, OrderService, SettlementService};

/// Axum 应用共享状态
///
/// 数据库连接池、缓存客户端与各业务服务，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// Redis 缓存客户端
    pub cache: Arc<Cache>,
    /// webhook 结算协调器
    pub settlement: Arc<SettlementService>,
    /// 支付意向管理器
    pub intents: Arc<IntentService>,
    /// 订单状态迁移服务
    pub orders: Arc<OrderService>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        pool: PgPool,
        cache: Arc<Cache>,
        settlement: Arc<SettlementService>,
        intents: Arc<IntentService>,
        orders: Arc<OrderService>,
    ) -> Self {
        Self {
            pool,
            cache,
            settlement,
            intents,
            orders,
        }
    }
}
