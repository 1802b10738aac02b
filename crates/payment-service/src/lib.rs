//! 支付结算服务
//!
//! 负责订单与外部支付渠道之间的对账闭环：
//!
//! - **支付意向**：为待支付订单创建/复用渠道支付意向
//! - **Webhook 结算**：验签、重放抑制、幂等结算、库存扣减、
//!   优惠券用量记录与领域事件发布
//! - **状态机**：订单/支付单的状态迁移规则与管理端迁移校验
//!
//! ## 模块结构
//!
//! - `models`: 订单、支付单、优惠券用量等实体模型与状态枚举
//! - `provider`: 各支付渠道适配器（验签 + 状态归一化 + 意向创建）
//! - `repository`: 数据访问层，含事务与行锁操作
//! - `service`: 意向管理、webhook 结算协调器、订单迁移
//! - `handlers` / `routes`: HTTP 接入层
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 存储：PostgreSQL (sqlx) + Redis（重放抑制）
//! - 事件出口：Kafka
//! - 数据验证：validator

pub mod error;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

// 重新导出核心类型
pub use error::{PaymentError, Result};
pub use models::{Order, OrderItem, OrderStatus, Payment, PaymentStatus, VoucherUsage};
pub use provider::{ProviderAdapter, ProviderRegistry, WebhookVerification};
pub use service::{IntentService, OrderService, SettlementService};
