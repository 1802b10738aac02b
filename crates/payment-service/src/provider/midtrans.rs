//! Midtrans 渠道适配器
//!
//! 签名方案：HMAC-SHA512，密钥为 Server Key，消息为
//! `order_id ‖ status_code ‖ gross_amount ‖ server_key`
//! （密钥在消息尾部再拼接一次），hex 编码后与载荷内的
//! `signature_key` 字段比对。比对必须走常数时间路径，
//! 且计算侧或上报侧任一为空都按无效处理。
//!
//! 状态词表：capture/settlement -> PAID，pending -> PENDING，
//! deny/cancel -> FAILED，expire -> EXPIRED，refund -> REFUNDED，
//! 其余一律 PENDING。

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::PaymentStatus;

use super::{IntentParams, ProviderIntent, WebhookVerification, normalize_amount};

type HmacSha512 = Hmac<Sha512>;

/// Midtrans 网关
pub struct MidtransGateway {
    /// 渠道标签，同时用作注册表 key 与指标 label
    name: String,
    server_key: String,
}

impl MidtransGateway {
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            name: "midtrans".to_string(),
            server_key: server_key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构建 Snap 支付意向
    ///
    /// 参考适配器为纯计算：本地生成 token 与跳转地址，不请求渠道。
    pub(super) fn create_intent(&self, params: &IntentParams) -> Result<ProviderIntent> {
        let token = Uuid::new_v4().to_string();
        let redirect_url = format!("https://app.sandbox.midtrans.com/snap/v2/vtweb/{token}");
        let expires_at_unix = Utc::now().timestamp() + params.expiry_seconds;

        debug!(
            order_id = %params.order_id,
            amount = params.amount,
            channel = ?params.channel,
            callback_base = %params.callback_base,
            "Midtrans 意向已构建"
        );

        Ok(ProviderIntent {
            provider: self.name.clone(),
            token,
            redirect_url,
            expires_at_unix: Some(expires_at_unix),
        })
    }

    /// 校验回调签名并归一化
    ///
    /// 签名字段在 JSON 载荷内部而非 header，因此必须先解析 JSON；
    /// 解析失败按 Malformed 处理，签名不匹配按 BadSignature 处理。
    pub(super) fn verify_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> WebhookVerification {
        let raw: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return WebhookVerification::malformed(format!("载荷不是合法 JSON: {e}")),
        };

        let order_id = raw
            .get("order_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status_code = raw
            .get("status_code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // gross_amount 参与签名的是载荷里的字面值：
        // 字符串取原文，数字取其十进制表示
        let gross_amount = match raw.get("gross_amount") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let provided = raw
            .get("signature_key")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if provided.is_empty() {
            return WebhookVerification::bad_signature("signature_key 缺失");
        }

        let expected = self.sign(&order_id, &status_code, &gross_amount);
        if expected.is_empty() {
            return WebhookVerification::bad_signature("签名计算结果为空");
        }

        // 常数时间比较，防止时序侧信道
        let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
        if !matches {
            return WebhookVerification::bad_signature("signature_key 不匹配");
        }

        let status = match raw
            .get("transaction_status")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "capture" | "settlement" => PaymentStatus::Paid,
            "pending" => PaymentStatus::Pending,
            "deny" | "cancel" => PaymentStatus::Failed,
            "expire" => PaymentStatus::Expired,
            "refund" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        };

        let amount = normalize_amount(raw.get("gross_amount")).unwrap_or(0);

        WebhookVerification::ok(order_id, amount, status, raw)
    }

    /// 计算签名：HMAC-SHA512(server_key, order_id ‖ status_code ‖ gross_amount ‖ server_key)
    fn sign(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        let Ok(mut mac) = HmacSha512::new_from_slice(self.server_key.as_bytes()) else {
            return String::new();
        };
        mac.update(order_id.as_bytes());
        mac.update(status_code.as_bytes());
        mac.update(gross_amount.as_bytes());
        mac.update(self.server_key.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
