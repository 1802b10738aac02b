//! 优惠券用量仓储
//!
//! 用量台账 + used_count 计数的幂等结算实现。
//! 幂等依据是 voucher_usages 上 (voucher_code, order_id) 的唯一约束：
//! ON CONFLICT DO NOTHING 在数据库侧原子地完成 check-then-insert，
//! 只有真正插入成功才增加 used_count。

use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::VoucherUsage;

/// 优惠券用量仓储
pub struct VoucherUsageRepository {
    pool: PgPool,
}

impl VoucherUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    /// 查询某订单对某优惠券的用量记录
    pub async fn get_usage(&self, code: &str, order_id: &str) -> Result<Option<VoucherUsage>> {
        let usage = sqlx::query_as::<_, VoucherUsage>(
            r#"
            SELECT id, voucher_code, order_id, user_id, discount_amount, created_at
            FROM voucher_usages
            WHERE voucher_code = $1 AND order_id = $2
            "#,
        )
        .bind(code)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(usage)
    }

    // ==================== 事务操作 ====================

    /// 在事务中幂等结算优惠券用量
    ///
    /// 同一 (voucher_code, order_id) 的重复调用只产生一行台账、
    /// 一次 used_count 自增。返回 true 表示本次真正写入，
    /// false 表示已结算过、本次跳过。
    pub async fn settle_in_tx(
        tx: &mut PgConnection,
        code: &str,
        order_id: &str,
        user_id: Option<&str>,
        discount_amount: i64,
    ) -> Result<bool> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO voucher_usages
                (voucher_code, order_id, user_id, discount_amount, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (voucher_code, order_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(code)
        .bind(order_id)
        .bind(user_id)
        .bind(discount_amount)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE vouchers
            SET used_count = used_count + 1
            WHERE code = $1
            "#,
        )
        .bind(code)
        .execute(tx)
        .await?;

        Ok(true)
    }
}
