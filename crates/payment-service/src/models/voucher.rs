//! 优惠券用量台账模型
//!
//! (voucher_code, order_id) 的唯一约束即幂等保证：
//! 结算重入时发现已有行就跳过，不会二次计数。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 优惠券用量记录
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VoucherUsage {
    pub id: i64,
    pub voucher_code: String,
    pub order_id: String,
    pub user_id: Option<String>,
    /// 结算时实际生效的优惠金额（最小货币单位，非负）
    pub discount_amount: i64,
    pub created_at: DateTime<Utc>,
}
