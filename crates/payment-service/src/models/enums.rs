//! 订单/支付状态枚举定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化。
//! 状态迁移规则集中在这里：服务层只调用这里的判定方法，
//! 不自行散落比较逻辑。

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 正向履约路径按 rank 单调递增：
/// PENDING_PAYMENT -> PAID -> PACKED -> SHIPPED -> OUT_FOR_DELIVERY -> DELIVERED。
/// CANCELED 只能由结算流程（支付失败/过期）或用户在待支付阶段主动取消产生。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 待支付 - 订单创建后等待支付确认
    #[default]
    PendingPayment,
    /// 已支付 - 结算协调器确认收款，触发库存/优惠券副作用
    Paid,
    /// 已打包
    Packed,
    /// 已发货
    Shipped,
    /// 派送中
    OutForDelivery,
    /// 已送达 - 履约终态
    Delivered,
    /// 已取消 - 支付失败/过期或用户在待支付阶段取消
    Canceled,
}

impl OrderStatus {
    /// 管理端迁移使用的全序 rank
    ///
    /// CANCELED 的 rank 低于所有正向状态，因此永远无法通过
    /// 「目标 rank 必须严格大于当前 rank」的管理端规则到达——
    /// 取消只能走结算流程或用户取消接口，这是刻意设计。
    pub fn rank(&self) -> i32 {
        match self {
            Self::Canceled => -1,
            Self::PendingPayment => 0,
            Self::Paid => 1,
            Self::Packed => 2,
            Self::Shipped => 3,
            Self::OutForDelivery => 4,
            Self::Delivered => 5,
        }
    }

    /// 管理端是否允许迁移到目标状态
    ///
    /// 只接受 rank 严格递增的正向迁移，不允许回退或原地迁移。
    pub fn admin_can_transition_to(&self, target: OrderStatus) -> bool {
        target.rank() > self.rank()
    }

    /// 用户是否可以主动取消
    ///
    /// 仅待支付阶段允许，支付确认后取消需走售后流程（不在本服务范围）。
    pub fn user_can_cancel(&self) -> bool {
        matches!(self, Self::PendingPayment)
    }

    /// 状态的 SCREAMING_SNAKE_CASE 字符串表示，用于日志与事件载荷
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Packed => "PACKED",
            Self::Shipped => "SHIPPED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 支付单状态
///
/// PENDING 之后进入终态：PAID / FAILED / EXPIRED。
/// 终态支付单不会复活，重新发起支付会创建新的支付单行。
/// REFUNDED 是渠道退款回调写入的审计状态，不触发任何订单副作用。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// 待支付 - 意向已创建，等待渠道回调
    #[default]
    Pending,
    /// 已支付 - 渠道确认收款
    Paid,
    /// 已失败 - 渠道拒绝或用户取消
    Failed,
    /// 已过期 - 超过意向有效期
    Expired,
    /// 已退款 - 渠道退款通知，仅作审计记录
    Refunded,
}

impl PaymentStatus {
    /// 是否为终态
    ///
    /// 终态支付单不可复用，意向管理器会为订单创建新的支付单行。
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// 状态的 SCREAMING_SNAKE_CASE 字符串表示，用于日志与事件载荷
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
