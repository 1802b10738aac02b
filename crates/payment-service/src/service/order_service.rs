//! 订单状态迁移服务
//!
//! 管理端迁移与用户取消两条受限路径。结算产生的迁移
//! （PAID / 失败取消）不走这里，由结算协调器在其事务内完成。

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::{PaymentError, Result};
use crate::models::{Order, OrderStatus};
use crate::repository::OrderRepository;

/// 订单状态迁移服务
pub struct OrderService {
    pool: PgPool,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 管理端状态迁移
    ///
    /// 只接受 rank 严格递增的正向迁移。CANCELED 的 rank 低于一切，
    /// 永远到不了这里——取消只存在于结算流程与用户取消接口。
    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn admin_transition(&self, order_id: &str, target: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order = OrderRepository::get_order_for_update(&mut tx, order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        if !order.status.admin_can_transition_to(target) {
            return Err(PaymentError::InvalidTransition {
                from: order.status.to_string(),
                to: target.to_string(),
            });
        }

        OrderRepository::update_status_in_tx(&mut tx, order_id, target).await?;
        tx.commit().await?;

        info!(from = %order.status, to = %target, "管理端订单状态迁移");

        Ok(Order {
            status: target,
            updated_at: Utc::now(),
            ..order
        })
    }

    /// 用户主动取消
    ///
    /// 仅待支付阶段允许；支付确认后的取消属于售后流程，不在本服务范围。
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_by_user(&self, order_id: &str) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order = OrderRepository::get_order_for_update(&mut tx, order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        if !order.status.user_can_cancel() {
            return Err(PaymentError::InvalidState(format!(
                "订单 {} 当前状态 {} 不可取消",
                order.id, order.status
            )));
        }

        OrderRepository::update_status_in_tx(&mut tx, order_id, OrderStatus::Canceled).await?;
        tx.commit().await?;

        info!(from = %order.status, "用户取消订单");

        Ok(Order {
            status: OrderStatus::Canceled,
            updated_at: Utc::now(),
            ..order
        })
    }
}
