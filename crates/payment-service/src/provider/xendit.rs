//! Xendit 渠道适配器
//!
//! 签名方案：HMAC-SHA256，密钥为回调密钥，消息为整个原始请求体，
//! hex 编码后与 `x-callback-signature` header 比对（常数时间）。
//! 与 Midtrans 不同，签名在 header 而非载荷内部，因此先验签
//! 再解析 JSON。
//!
//! 状态词表：paid/settled/success -> PAID，pending 及
//! *pending_verification -> PENDING，expired -> EXPIRED，
//! failed/canceled -> FAILED，其余一律 PENDING。

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::PaymentStatus;

use super::{IntentParams, ProviderIntent, WebhookVerification, normalize_amount};

type HmacSha256 = Hmac<Sha256>;

/// 回调签名 header
const SIGNATURE_HEADER: &str = "x-callback-signature";

/// Xendit 网关
pub struct XenditGateway {
    /// 渠道标签，同时用作注册表 key 与指标 label
    name: String,
    webhook_secret: String,
}

impl XenditGateway {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            name: "xendit".to_string(),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构建 Invoice 支付意向（纯计算，不请求渠道）
    pub(super) fn create_intent(&self, params: &IntentParams) -> Result<ProviderIntent> {
        let token = Uuid::new_v4().to_string();
        let redirect_url = format!("https://checkout.xendit.co/web/{token}");
        let expires_at_unix = Utc::now().timestamp() + params.expiry_seconds;

        debug!(
            order_id = %params.order_id,
            amount = params.amount,
            channel = ?params.channel,
            callback_base = %params.callback_base,
            "Xendit 意向已构建"
        );

        Ok(ProviderIntent {
            provider: self.name.clone(),
            token,
            redirect_url,
            expires_at_unix: Some(expires_at_unix),
        })
    }

    /// 校验回调签名并归一化
    pub(super) fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> WebhookVerification {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if provided.is_empty() {
            return WebhookVerification::bad_signature(format!("{SIGNATURE_HEADER} header 缺失"));
        }

        let expected = self.sign(body);
        if expected.is_empty() {
            return WebhookVerification::bad_signature("签名计算结果为空");
        }

        // 常数时间比较，防止时序侧信道
        let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
        if !matches {
            return WebhookVerification::bad_signature(format!("{SIGNATURE_HEADER} 不匹配"));
        }

        let raw: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return WebhookVerification::malformed(format!("载荷不是合法 JSON: {e}")),
        };

        let order_id = raw
            .get("external_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let status = normalize_status(
            raw.get("status")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );

        let amount = normalize_amount(raw.get("amount")).unwrap_or(0);

        WebhookVerification::ok(order_id, amount, status, raw)
    }

    /// 计算签名：HMAC-SHA256(webhook_secret, raw_body)
    fn sign(&self, body: &[u8]) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) else {
            return String::new();
        };
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// 状态词表归一化
///
/// 大小写不敏感；`*pending_verification` 的后缀匹配兼容
/// `awaiting_pending_verification` 这类组合词。
fn normalize_status(status: &str) -> PaymentStatus {
    let s = status.to_ascii_lowercase();
    match s.as_str() {
        "paid" | "settled" | "success" => PaymentStatus::Paid,
        "expired" => PaymentStatus::Expired,
        "failed" | "canceled" => PaymentStatus::Failed,
        "pending" => PaymentStatus::Pending,
        _ if s.ends_with("pending_verification") => PaymentStatus::Pending,
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VerifyFailure;
    use serde_json::json;

    const TEST_SECRET: &str = "xnd-webhook-test-secret";

    fn gateway() -> XenditGateway {
        XenditGateway::new(TEST_SECRET)
    }

    /// 构造带合法签名 header 的请求
    fn signed_request(payload: &Value) -> (HeaderMap, Vec<u8>) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = gateway().sign(&body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        (headers, body)
    }

    #[test]
    fn test_verify_valid_paid() {
        let (headers, body) = signed_request(&json!({
            "external_id": "ord-001",
            "status": "PAID",
            "amount": 150000,
            "payer_email": "u1@example.com",
        }));

        let v = gateway().verify_webhook(&headers, &body);
        assert!(v.valid);
        assert_eq!(v.order_id, "ord-001");
        assert_eq!(v.amount, 150_000);
        assert_eq!(v.status, PaymentStatus::Paid);
        assert_eq!(v.raw["payer_email"], "u1@example.com");
    }

    #[test]
    fn test_verify_float_amount_coerced() {
        let (headers, body) = signed_request(&json!({
            "external_id": "ord-002",
            "status": "paid",
            "amount": 150000.6,
        }));

        let v = gateway().verify_webhook(&headers, &body);
        assert!(v.valid);
        assert_eq!(v.amount, 150_001);
    }

    #[test]
    fn test_verify_missing_header_rejected() {
        let body = serde_json::to_vec(&json!({
            "external_id": "ord-001",
            "status": "PAID",
            "amount": 150000,
        }))
        .unwrap();

        let v = gateway().verify_webhook(&HeaderMap::new(), &body);
        assert!(!v.valid);
        assert!(v.error().unwrap().contains(SIGNATURE_HEADER));
    }

    #[test]
    fn test_verify_tampered_body_rejected() {
        let (headers, _body) = signed_request(&json!({
            "external_id": "ord-001",
            "status": "PAID",
            "amount": 150000,
        }));

        // 签名对应旧载荷，替换请求体后必须拒绝
        let tampered = serde_json::to_vec(&json!({
            "external_id": "ord-001",
            "status": "PAID",
            "amount": 1,
        }))
        .unwrap();

        let v = gateway().verify_webhook(&headers, &tampered);
        assert!(!v.valid);
        assert!(matches!(v.failure, Some(VerifyFailure::BadSignature(_))));
    }

    #[test]
    fn test_verify_wrong_secret_rejected() {
        let other = XenditGateway::new("another-secret");
        let body = serde_json::to_vec(&json!({
            "external_id": "ord-001",
            "status": "PAID",
            "amount": 150000,
        }))
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, other.sign(&body).parse().unwrap());

        let v = gateway().verify_webhook(&headers, &body);
        assert!(!v.valid);
    }

    #[test]
    fn test_verify_valid_signature_malformed_json() {
        // 签名本身合法但载荷不是 JSON：按 Malformed 处理（映射 400 而非 401）
        let body = b"plain text body".to_vec();
        let signature = gateway().sign(&body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());

        let v = gateway().verify_webhook(&headers, &body);
        assert!(!v.valid);
        assert!(matches!(v.failure, Some(VerifyFailure::Malformed(_))));
    }

    #[test]
    fn test_status_vocabulary() {
        let cases = [
            ("PAID", PaymentStatus::Paid),
            ("paid", PaymentStatus::Paid),
            ("SETTLED", PaymentStatus::Paid),
            ("success", PaymentStatus::Paid),
            ("PENDING", PaymentStatus::Pending),
            ("awaiting_pending_verification", PaymentStatus::Pending),
            ("pending_verification", PaymentStatus::Pending),
            ("EXPIRED", PaymentStatus::Expired),
            ("FAILED", PaymentStatus::Failed),
            ("canceled", PaymentStatus::Failed),
            // 未知状态保守归为 PENDING
            ("on_hold", PaymentStatus::Pending),
            ("", PaymentStatus::Pending),
        ];

        for (status, expected) in cases {
            assert_eq!(normalize_status(status), expected, "状态映射错误: {status}");
        }
    }

    #[test]
    fn test_create_intent() {
        let params = IntentParams {
            order_id: "ord-001".to_string(),
            amount: 150_000,
            channel: Some("invoice".to_string()),
            expiry_seconds: 600,
            callback_base: "http://localhost:8080".to_string(),
        };

        let intent = gateway().create_intent(&params).unwrap();
        assert_eq!(intent.provider, "xendit");
        assert!(intent.redirect_url.starts_with("https://checkout.xendit.co/web/"));
        assert!(intent.expires_at_unix.is_some());
    }
}
