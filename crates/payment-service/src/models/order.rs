//! 订单实体模型
//!
//! 订单由下单链路创建（不在本服务范围），本服务只做两类变更：
//! 结算协调器的状态迁移，以及管理端/用户的受限迁移。
//! 订单永不删除，只做状态流转。

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enums::OrderStatus;

/// 订单
///
/// 金额字段全部为整数最小货币单位，由定价链路在下单时固化；
/// 结算时只核对不重算。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    /// 归属用户，游客单为空
    pub user_id: Option<String>,
    /// 联系邮箱，游客单据此触达
    pub email: Option<String>,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub shipping_fee: i64,
    pub total: i64,
    /// 下单时使用的优惠券码，结算时据此写用量台账
    pub voucher_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 订单行
///
/// `variant_id` 为空的行（如虚拟商品、运费行）没有库存台账，
/// 结算时跳过库存扣减。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub product_name: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
}
