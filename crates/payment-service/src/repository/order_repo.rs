//! 订单仓储
//!
//! 提供订单与订单行的数据访问，支持事务和行级锁。
//! 结算协调器的所有写操作都走 `*_in_tx` 变体，保证与支付单
//! 变更同事务提交。

use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{Order, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = "id, user_id, email, status, subtotal, discount, tax, \
     shipping_fee, total, voucher_code, created_at, updated_at";

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    /// 按 ID 获取订单
    pub async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// 列出订单的全部行项目
    pub async fn list_items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_name, variant_id, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    // ==================== 事务操作 ====================

    /// 在事务中获取订单（带行级锁）
    ///
    /// 使用 FOR UPDATE 锁定行，串行化同一订单上的并发结算
    /// 与管理端迁移。
    pub async fn get_order_for_update(tx: &mut PgConnection, id: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(tx)
        .await?;

        Ok(order)
    }

    /// 在事务中更新订单状态
    pub async fn update_status_in_tx(
        tx: &mut PgConnection,
        id: &str,
        status: OrderStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 在事务中列出订单行项目
    pub async fn list_items_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_name, variant_id, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(tx)
        .await?;

        Ok(items)
    }

    /// 在事务中扣减变体库存
    ///
    /// 使用增量更新而非覆盖，避免并发问题
    pub async fn decrement_variant_stock_in_tx(
        tx: &mut PgConnection,
        variant_id: &str,
        quantity: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = stock - $2
            WHERE id = $1
            "#,
        )
        .bind(variant_id)
        .bind(quantity as i64)
        .execute(tx)
        .await?;

        Ok(())
    }
}
