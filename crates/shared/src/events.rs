//! 领域事件模型与发布抽象
//!
//! 定义结算流程对外广播的事件信封格式，以及 `EventPublisher` trait
//! 作为事件出口的核心抽象。结算协调器在事务提交之后才发布事件，
//! 发布失败只记日志，绝不回滚已提交的结算。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::kafka::{KafkaProducer, topics};

// ---------------------------------------------------------------------------
// DomainEventType — 事件类型枚举
// ---------------------------------------------------------------------------

/// 领域事件类型
///
/// 每种类型映射到一个独立 topic，下游按需订阅：
/// 库存/物流关心 `order.paid`，营销召回关心取消与过期。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventType {
    OrderPaid,
    OrderCanceled,
    PaymentFailed,
    PaymentExpired,
}

impl DomainEventType {
    /// 事件对应的 Kafka topic
    pub fn topic(&self) -> &'static str {
        match self {
            Self::OrderPaid => topics::ORDER_PAID,
            Self::OrderCanceled => topics::ORDER_CANCELED,
            Self::PaymentFailed => topics::PAYMENT_FAILED,
            Self::PaymentExpired => topics::PAYMENT_EXPIRED,
        }
    }
}

impl std::fmt::Display for DomainEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OrderPaid => "ORDER_PAID",
            Self::OrderCanceled => "ORDER_CANCELED",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::PaymentExpired => "PAYMENT_EXPIRED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// DomainEvent — 事件信封
// ---------------------------------------------------------------------------

/// 领域事件信封
///
/// 所有结算相关事件共用同一载荷结构：
/// - `event_id`（UUID v7）时间有序，供下游做幂等去重
/// - `order_id`/`payment_id` 定位业务实体
/// - `user_id`/`email` 仅在可解析时携带（游客单可能两者皆空）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_id: String,
    pub event_type: DomainEventType,
    pub order_id: String,
    pub payment_id: String,
    /// 事件发生时支付/订单的归一化状态字符串
    pub status: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// 构建新事件，自动生成 UUID v7 作为 event_id 并记录当前时间
    pub fn new(
        event_type: DomainEventType,
        order_id: impl Into<String>,
        payment_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            event_type,
            order_id: order_id.into(),
            payment_id: payment_id.into(),
            status: status.into(),
            user_id: None,
            email: None,
            occurred_at: Utc::now(),
        }
    }

    /// 附加用户信息（可解析时）
    pub fn with_user(mut self, user_id: Option<String>, email: Option<String>) -> Self {
        self.user_id = user_id;
        self.email = email;
        self
    }
}

// ---------------------------------------------------------------------------
// EventPublisher trait — 事件出口抽象
// ---------------------------------------------------------------------------

/// 领域事件发布器
///
/// 结算协调器只依赖此 trait，不感知具体传输方式；
/// 测试中用 mock 替换即可断言事件内容与次数。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布单个事件；失败由调用方决定是否忽略
    async fn publish(&self, event: &DomainEvent) -> Result<(), CoreError>;
}

/// 基于 Kafka 的发布器实现
///
/// 以 order_id 为消息 key，保证同一订单的事件落在同一分区、保持顺序。
pub struct KafkaEventPublisher {
    producer: KafkaProducer,
}

impl KafkaEventPublisher {
    pub fn new(producer: KafkaProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), CoreError> {
        self.producer
            .send_json(event.event_type.topic(), &event.order_id, event)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
