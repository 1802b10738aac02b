//! Webhook 结算协调器
//!
//! 支付回调的事务核心，处理一次回调的完整闭环：
//!
//! 1. 按路径参数解析渠道适配器
//! 2. 验签 + 状态归一化（纯计算，未触碰任何状态）
//! 3. 重放抑制：原始请求体 SHA-256 指纹 + Redis SET NX EX 原子占位
//! 4.-9. 单个数据库事务内：行锁加载支付单与订单、金额核对、
//!    幂等闸门、支付状态与审计流水落库、按需执行订单迁移 /
//!    库存扣减 / 优惠券用量结算，最后提交
//! 10. 提交后尽力发布领域事件（失败只记日志）
//!
//! ## 幂等设计
//!
//! 重放抑制只拦「完全相同的回调体」，是尽力而为的前置挡板；
//! 真正的正确性保证是事务内的幂等闸门：
//! `should_settle = 归一化状态为 PAID 且支付单尚未 PAID`。
//! 两个不同载荷的 PAID 回调并发到达时，行锁使其串行，
//! 后到者会看到已 PAID 的支付单而跳过全部副作用。
//!
//! ## 失败语义
//!
//! 事务内任何失败整体回滚，不存在半截结算；此时重放标记会被
//! 尽力释放，渠道按 5xx 重试同一载荷不会被误拦。
//! 事件发布失败绝不把已提交的结算改报为失败。

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use storefront_shared::cache::{Cache, CacheKey};
use storefront_shared::events::{DomainEvent, DomainEventType, EventPublisher};
use storefront_shared::observability::metrics as obs_metrics;

use crate::error::{PaymentError, Result};
use crate::models::{OrderStatus, PaymentStatus};
use crate::provider::{ProviderRegistry, VerifyFailure, WebhookVerification};
use crate::repository::{OrderRepository, PaymentRepository, VoucherUsageRepository};

/// 一次结算的事务内产出，提交后据此发布事件与打点
struct SettlementOutcome {
    order_id: String,
    payment_id: String,
    user_id: Option<String>,
    email: Option<String>,
    normalized_status: PaymentStatus,
    /// 本次回调触发了结算副作用（订单转 PAID + 库存/优惠券）
    settled: bool,
    /// 本次回调将订单转为 CANCELED
    order_canceled: bool,
}

/// Webhook 结算协调器
pub struct SettlementService {
    pool: PgPool,
    cache: Arc<Cache>,
    registry: Arc<ProviderRegistry>,
    publisher: Arc<dyn EventPublisher>,
    replay_ttl: Duration,
}

impl SettlementService {
    pub fn new(
        pool: PgPool,
        cache: Arc<Cache>,
        registry: Arc<ProviderRegistry>,
        publisher: Arc<dyn EventPublisher>,
        replay_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            registry,
            publisher,
            replay_ttl,
        }
    }

    /// 处理一次渠道回调
    ///
    /// 成功返回 `Ok(())`，HTTP 层据此响应 204；
    /// 各类失败按 [`PaymentError`] 的状态码映射驱动渠道的重试行为。
    #[instrument(skip(self, headers, body), fields(provider = %provider_key))]
    pub async fn handle_webhook(
        &self,
        provider_key: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<()> {
        let started = std::time::Instant::now();

        // 1. 解析渠道；未知 key -> 404
        let Some(adapter) = self.registry.resolve(provider_key) else {
            obs_metrics::record_webhook_callback(provider_key, "rejected");
            return Err(PaymentError::ProviderNotFound(provider_key.to_string()));
        };
        let provider = adapter.name().to_string();

        // 2. 验签 + 归一化（纯计算，此处未触碰任何状态）
        let verification = adapter.verify_webhook(headers, body);
        if !verification.valid {
            warn!(
                provider = %provider,
                reason = verification.error().unwrap_or("unknown"),
                "webhook 验签未通过"
            );
            obs_metrics::record_webhook_callback(&provider, "rejected");
            return Err(match verification.failure {
                Some(VerifyFailure::Malformed(msg)) => PaymentError::InvalidInput(msg),
                Some(VerifyFailure::BadSignature(msg)) => PaymentError::SignatureInvalid(msg),
                None => PaymentError::SignatureInvalid("验签失败".to_string()),
            });
        }

        // 3. 重放抑制：对原始请求体取指纹，按渠道隔离，原子占位。
        //    只拦完全相同的载荷；同一订单的不同载荷由幂等闸门兜底。
        let fingerprint = hex::encode(Sha256::digest(body));
        let replay_key = CacheKey::webhook_replay(&provider, &fingerprint);
        let first_seen = self
            .cache
            .set_nx(&replay_key, &1u8, self.replay_ttl)
            .await
            .map_err(|e| PaymentError::Redis(e.to_string()))?;
        if !first_seen {
            debug!(provider = %provider, order_id = %verification.order_id, "重复 webhook，已拦截");
            obs_metrics::record_webhook_callback(&provider, "replayed");
            return Err(PaymentError::DuplicateWebhook);
        }

        // 4.-9. 单事务结算
        match self.settle(&verification).await {
            Ok(outcome) => {
                // 10. 提交后发布领域事件，失败只记日志
                self.emit_events(&outcome).await;

                if outcome.settled {
                    obs_metrics::record_settlement(
                        &provider,
                        outcome.normalized_status.as_str(),
                        started.elapsed().as_secs_f64(),
                    );
                    obs_metrics::record_webhook_callback(&provider, "settled");
                } else {
                    obs_metrics::record_webhook_callback(&provider, "recorded");
                }

                info!(
                    provider = %provider,
                    order_id = %outcome.order_id,
                    payment_id = %outcome.payment_id,
                    status = %outcome.normalized_status,
                    settled = outcome.settled,
                    "webhook 处理完成"
                );
                Ok(())
            }
            Err(e) => {
                // 结算未提交，释放重放标记让渠道的重试不被误拦；
                // 释放失败只能依赖 TTL 兜底过期
                if let Err(del_err) = self.cache.delete(&replay_key).await {
                    warn!(key = %replay_key, error = %del_err, "重放标记释放失败");
                }
                obs_metrics::record_webhook_callback(&provider, "error");
                Err(e)
            }
        }
    }

    /// 步骤 4-9：单个事务内的结算主体
    ///
    /// 任何错误返回都会 drop 事务并整体回滚，调用方看不到部分副作用。
    async fn settle(&self, v: &WebhookVerification) -> Result<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        // 5. 行锁加载订单最近一次支付单；并发结算在此串行化
        let payment = PaymentRepository::latest_for_order_for_update(&mut tx, &v.order_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(v.order_id.clone()))?;

        // 金额核对：渠道上报非零金额必须与支付单一致，不一致立即中止（零副作用）
        if v.amount != 0 && v.amount != payment.amount {
            return Err(PaymentError::AmountMismatch {
                expected: payment.amount,
                actual: v.amount,
            });
        }

        let order = OrderRepository::get_order_for_update(&mut tx, &payment.order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(payment.order_id.clone()))?;

        // 6. 幂等闸门：只有「首次确认已支付」才触发下游副作用
        let should_settle =
            v.status == PaymentStatus::Paid && payment.status != PaymentStatus::Paid;

        // 7. 支付状态与审计流水每次回调都落——审计记录渠道说过什么，
        //    下游副作用才由幂等闸门拦截
        PaymentRepository::update_status_in_tx(&mut tx, &payment.id, v.status, &v.raw).await?;
        PaymentRepository::append_event_in_tx(&mut tx, &payment.id, v.status, Some(&v.raw))
            .await?;

        // 8. 按归一化状态分支
        let mut settled = false;
        let mut order_canceled = false;
        match v.status {
            PaymentStatus::Paid if should_settle => {
                OrderRepository::update_status_in_tx(&mut tx, &order.id, OrderStatus::Paid)
                    .await?;

                // 带变体的订单行逐行扣库存；无变体的行没有库存台账，跳过
                let items = OrderRepository::list_items_in_tx(&mut tx, &order.id).await?;
                for item in &items {
                    if let Some(variant_id) = &item.variant_id {
                        OrderRepository::decrement_variant_stock_in_tx(
                            &mut tx,
                            variant_id,
                            item.quantity,
                        )
                        .await?;
                    }
                }

                // 优惠券用量结算：(voucher, order) 维度幂等，优惠金额钳到非负
                if let Some(code) = &order.voucher_code {
                    VoucherUsageRepository::settle_in_tx(
                        &mut tx,
                        code,
                        &order.id,
                        order.user_id.as_deref(),
                        order.discount.max(0),
                    )
                    .await?;
                }

                settled = true;
            }
            PaymentStatus::Failed | PaymentStatus::Expired
                if order.status == OrderStatus::PendingPayment =>
            {
                OrderRepository::update_status_in_tx(&mut tx, &order.id, OrderStatus::Canceled)
                    .await?;
                order_canceled = true;
            }
            // 其余组合（重复 PAID、退款、pending 回调等）不触碰订单
            _ => {}
        }

        // 9. 提交
        tx.commit().await?;

        Ok(SettlementOutcome {
            order_id: order.id,
            payment_id: payment.id,
            user_id: order.user_id,
            email: order.email,
            normalized_status: v.status,
            settled,
            order_canceled,
        })
    }

    /// 步骤 10：提交后发布领域事件
    ///
    /// 事件只是对下游的通知，发布失败绝不把已提交的结算改报为失败。
    async fn emit_events(&self, outcome: &SettlementOutcome) {
        let mut events = Vec::new();

        match outcome.normalized_status {
            PaymentStatus::Paid if outcome.settled => {
                events.push(DomainEvent::new(
                    DomainEventType::OrderPaid,
                    &outcome.order_id,
                    &outcome.payment_id,
                    PaymentStatus::Paid.as_str(),
                ));
            }
            PaymentStatus::Failed => {
                events.push(DomainEvent::new(
                    DomainEventType::PaymentFailed,
                    &outcome.order_id,
                    &outcome.payment_id,
                    PaymentStatus::Failed.as_str(),
                ));
            }
            PaymentStatus::Expired => {
                events.push(DomainEvent::new(
                    DomainEventType::PaymentExpired,
                    &outcome.order_id,
                    &outcome.payment_id,
                    PaymentStatus::Expired.as_str(),
                ));
            }
            _ => {}
        }

        if outcome.order_canceled {
            events.push(DomainEvent::new(
                DomainEventType::OrderCanceled,
                &outcome.order_id,
                &outcome.payment_id,
                OrderStatus::Canceled.as_str(),
            ));
        }

        for event in events {
            let event = event.with_user(outcome.user_id.clone(), outcome.email.clone());
            if let Err(e) = self.publisher.publish(&event).await {
                warn!(
                    event_type = %event.event_type,
                    order_id = %event.order_id,
                    error = %e,
                    "领域事件发布失败，忽略"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// 幂等闸门的真值表：只有「PAID 且此前未 PAID」触发结算
    #[test]
    fn test_should_settle_gate() {
        let cases = [
            // (归一化状态, 支付单当前状态, 期望)
            (PaymentStatus::Paid, PaymentStatus::Pending, true),
            (PaymentStatus::Paid, PaymentStatus::Failed, true),
            (PaymentStatus::Paid, PaymentStatus::Paid, false),
            (PaymentStatus::Pending, PaymentStatus::Pending, false),
            (PaymentStatus::Failed, PaymentStatus::Pending, false),
            (PaymentStatus::Expired, PaymentStatus::Pending, false),
            (PaymentStatus::Refunded, PaymentStatus::Paid, false),
        ];

        for (incoming, current, expected) in cases {
            let should_settle = incoming == PaymentStatus::Paid && current != PaymentStatus::Paid;
            assert_eq!(
                should_settle, expected,
                "闸门判定错误: incoming={incoming}, current={current}"
            );
        }
    }

    /// 重放指纹只依赖原始请求体：同体同指纹，异体异指纹
    #[test]
    fn test_replay_fingerprint() {
        let body_a = serde_json::to_vec(&json!({"order_id": "ord-1", "transaction_status": "pending"})).unwrap();
        let body_b = serde_json::to_vec(&json!({"order_id": "ord-1", "transaction_status": "settlement"})).unwrap();

        let fp_a1 = hex::encode(Sha256::digest(&body_a));
        let fp_a2 = hex::encode(Sha256::digest(&body_a));
        let fp_b = hex::encode(Sha256::digest(&body_b));

        assert_eq!(fp_a1, fp_a2);
        // 同一订单的不同载荷指纹不同——重放抑制拦不住它们，
        // 这正是幂等闸门存在的原因
        assert_ne!(fp_a1, fp_b);

        let key = CacheKey::webhook_replay("midtrans", &fp_a1);
        assert!(key.starts_with("webhook:replay:midtrans:"));
    }
}
