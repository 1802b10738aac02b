//! 支付意向管理
//!
//! 为待支付订单创建或复用渠道支付意向，保证同一订单同一时刻
//! 至多一条活跃（PENDING 且未过期）支付单：
//!
//! 1. 行锁加载订单，状态必须是待支付
//! 2. 调用方显式传入的金额必须与订单应付总额一致
//! 3. 最近一次支付单已 PAID -> 拒绝；活跃 -> 原样复用（幂等）
//! 4. 否则调用渠道适配器构建意向，新支付单与首条审计流水
//!    同事务落库
//!
//! 这里没有任何库存/优惠券副作用——那些只属于结算。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use storefront_shared::config::PaymentConfig;
use storefront_shared::observability::metrics as obs_metrics;

use crate::error::{PaymentError, Result};
use crate::models::{OrderStatus, Payment, PaymentStatus};
use crate::provider::{IntentParams, ProviderRegistry};
use crate::repository::{OrderRepository, PaymentRepository};

/// 创建支付意向的指令
#[derive(Debug, Clone)]
pub struct CreateIntentCommand {
    pub order_id: String,
    /// 目标渠道标签（midtrans / xendit）
    pub provider: String,
    /// 调用方声明的金额；0 表示直接按订单应付总额
    pub amount: i64,
    /// 渠道内支付方式，透传
    pub channel: Option<String>,
}

/// 支付意向管理器
pub struct IntentService {
    pool: PgPool,
    registry: Arc<ProviderRegistry>,
    config: PaymentConfig,
}

impl IntentService {
    pub fn new(pool: PgPool, registry: Arc<ProviderRegistry>, config: PaymentConfig) -> Self {
        Self {
            pool,
            registry,
            config,
        }
    }

    /// 创建或复用支付意向
    ///
    /// 幂等：活跃意向存在时原样返回，不产生任何新行；
    /// 否则恰好新增一条支付单和一条审计流水。
    #[instrument(skip(self), fields(order_id = %cmd.order_id, provider = %cmd.provider))]
    pub async fn create_intent(&self, cmd: CreateIntentCommand) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        // 1. 行锁加载订单，串行化同一订单上的并发意向创建
        let order = OrderRepository::get_order_for_update(&mut tx, &cmd.order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(cmd.order_id.clone()))?;

        if order.status != OrderStatus::PendingPayment {
            return Err(PaymentError::InvalidState(format!(
                "订单 {} 当前状态 {} 不可发起支付",
                order.id, order.status
            )));
        }

        // 2. 金额一致性：显式传入的金额必须等于订单应付总额
        if cmd.amount != 0 && cmd.amount != order.total {
            return Err(PaymentError::InvalidInput(format!(
                "金额不一致: 订单应付 {}, 请求 {}",
                order.total, cmd.amount
            )));
        }

        // 3. 最近一次支付单：已支付拒绝，活跃意向幂等复用
        if let Some(latest) =
            PaymentRepository::latest_for_order_for_update(&mut tx, &order.id).await?
        {
            if latest.status == PaymentStatus::Paid {
                return Err(PaymentError::AlreadyPaid(order.id.clone()));
            }
            if latest.is_active(Utc::now()) {
                tx.commit().await?;
                info!(
                    order_id = %order.id,
                    payment_id = %latest.id,
                    "复用活跃支付意向"
                );
                obs_metrics::record_payment_intent(&latest.provider, true);
                return Ok(latest);
            }
        }

        // 4. 渠道构建意向（纯计算），新支付单与首条审计流水同事务落库
        let adapter = self
            .registry
            .resolve(&cmd.provider)
            .ok_or_else(|| PaymentError::ProviderNotFound(cmd.provider.clone()))?;

        let params = IntentParams {
            order_id: order.id.clone(),
            amount: order.total,
            channel: cmd.channel.clone(),
            expiry_seconds: self.config.intent_expiry_seconds,
            callback_base: self.config.callback_base_url.clone(),
        };
        let intent = adapter.create_intent(&params)?;

        let now = Utc::now();
        // 渠道未给有效期时回退配置的默认值（出厂 15 分钟）
        let expires_at = intent
            .expires_at_unix
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.config.intent_expiry_seconds));

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            provider: intent.provider.clone(),
            channel: cmd.channel,
            status: PaymentStatus::Pending,
            amount: order.total,
            token: Some(intent.token),
            redirect_url: Some(intent.redirect_url),
            expires_at: Some(expires_at),
            raw_payload: None,
            created_at: now,
            updated_at: now,
        };

        PaymentRepository::create_in_tx(&mut tx, &payment).await?;
        PaymentRepository::append_event_in_tx(&mut tx, &payment.id, PaymentStatus::Pending, None)
            .await?;
        tx.commit().await?;

        info!(
            order_id = %payment.order_id,
            payment_id = %payment.id,
            provider = %payment.provider,
            amount = payment.amount,
            "支付意向已创建"
        );
        obs_metrics::record_payment_intent(&payment.provider, false);
        Ok(payment)
    }
}
