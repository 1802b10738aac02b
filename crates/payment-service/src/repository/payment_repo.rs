//! 支付单仓储
//!
//! 支付单的创建、状态更新与审计流水追加。
//! 「最近一次支付」的行锁读取是结算并发控制的核心：两个并发
//! 回调会在此排队，后到者看到的是前者提交后的状态，
//! 幂等闸门据此拦截重复结算。

use sqlx::{PgConnection, PgPool, Row};

use crate::error::Result;
use crate::models::{Payment, PaymentEvent, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, order_id, provider, channel, status, amount, token, \
     redirect_url, expires_at, raw_payload, created_at, updated_at";

/// 支付单仓储
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    /// 获取订单最近一次支付单
    pub async fn latest_for_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// 列出支付单的审计流水（按时间正序）
    pub async fn list_events(&self, payment_id: &str) -> Result<Vec<PaymentEvent>> {
        let events = sqlx::query_as::<_, PaymentEvent>(
            r#"
            SELECT id, payment_id, status, raw_payload, created_at
            FROM payment_events
            WHERE payment_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    // ==================== 事务操作 ====================

    /// 在事务中获取订单最近一次支付单（带行级锁）
    ///
    /// FOR UPDATE 配合 ORDER BY/LIMIT 只锁住最新的那一行，
    /// 历史终态支付单不受影响。
    pub async fn latest_for_order_for_update(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(tx)
        .await?;

        Ok(payment)
    }

    /// 在事务中创建支付单
    pub async fn create_in_tx(tx: &mut PgConnection, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, provider, channel, status, amount, token,
                 redirect_url, expires_at, raw_payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(&payment.provider)
        .bind(&payment.channel)
        .bind(payment.status)
        .bind(payment.amount)
        .bind(&payment.token)
        .bind(&payment.redirect_url)
        .bind(payment.expires_at)
        .bind(&payment.raw_payload)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 在事务中更新支付单状态与最近一次原始载荷
    pub async fn update_status_in_tx(
        tx: &mut PgConnection,
        id: &str,
        status: PaymentStatus,
        raw_payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, raw_payload = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(raw_payload)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 在事务中追加审计流水
    ///
    /// 每次状态写入都落一行，重复回调也不例外——审计要的是
    /// 「渠道说过什么」，不是「我们采信了什么」。
    pub async fn append_event_in_tx(
        tx: &mut PgConnection,
        payment_id: &str,
        status: PaymentStatus,
        raw_payload: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO payment_events (payment_id, status, raw_payload, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .bind(raw_payload)
        .fetch_one(tx)
        .await?;

        Ok(row.get("id"))
    }
}
