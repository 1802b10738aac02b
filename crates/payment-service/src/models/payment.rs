//! 支付单与支付审计流水模型

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enums::PaymentStatus;

/// 支付单
///
/// 一个订单随时间可以有多条支付单（意向过期重建），
/// 但「活跃」的——PENDING 且未过期——同一时刻至多一条。
/// 由意向管理器创建，只有结算协调器会变更其状态。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// 渠道标识（midtrans / xendit），同时是 webhook 路径参数
    pub provider: String,
    /// 渠道内支付方式（qris / bank_transfer / invoice 等），透传不解释
    pub channel: Option<String>,
    pub status: PaymentStatus,
    /// 应付金额（最小货币单位）；之后每次渠道上报都与其核对
    pub amount: i64,
    /// 渠道下发的意向 token
    pub token: Option<String>,
    /// 用户完成支付的跳转地址
    pub redirect_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// 最近一次渠道回调的原始载荷，仅作审计与重放排查
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// 是否为活跃意向（PENDING 且未过期）
    ///
    /// 活跃意向会被意向管理器幂等复用，而不是重新创建。
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// 支付审计流水
///
/// 只追加、永不修改删除：每次创建支付单和每次状态变更各落一行，
/// 重复回调也会落行（下游副作用由幂等闸门拦截，审计不拦）。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub id: i64,
    pub payment_id: String,
    pub status: PaymentStatus,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
