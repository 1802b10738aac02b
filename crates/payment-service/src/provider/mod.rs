//! 支付渠道适配器
//!
//! 每个外部支付渠道实现同一个能力契约：
//! - `create_intent`: 构建支付意向（纯计算，不发起网络调用）
//! - `verify_webhook`: 校验回调签名并把渠道各自的状态词表
//!   归一化为 [`PaymentStatus`]
//!
//! 渠道集合是封闭的：用枚举变体而非 trait object 建模，
//! 渠道标签取自网关结构体上的显式字段，不做类型名反推。
//! 验签失败永远以返回值表达（`valid = false` + 诊断信息），
//! 不抛错误，调用方据此产生统一的 4xx 响应。

pub mod midtrans;
pub mod xendit;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde_json::Value;

use storefront_shared::config::PaymentConfig;

use crate::error::{PaymentError, Result};
use crate::models::PaymentStatus;

pub use midtrans::MidtransGateway;
pub use xendit::XenditGateway;

// ---------------------------------------------------------------------------
// 契约类型
// ---------------------------------------------------------------------------

/// 创建支付意向的入参
#[derive(Debug, Clone)]
pub struct IntentParams {
    pub order_id: String,
    /// 应付金额（最小货币单位）
    pub amount: i64,
    /// 渠道内支付方式，透传给渠道
    pub channel: Option<String>,
    /// 意向有效期（秒）
    pub expiry_seconds: i64,
    /// 渠道回调的基地址
    pub callback_base: String,
}

/// 渠道返回的支付意向
#[derive(Debug, Clone)]
pub struct ProviderIntent {
    pub provider: String,
    pub token: String,
    pub redirect_url: String,
    /// 渠道给出的过期时间（Unix 秒）；为空时由意向管理器回退默认值
    pub expires_at_unix: Option<i64>,
}

/// 验签失败的具体原因
///
/// 载荷解析失败与签名不匹配映射到不同的 HTTP 状态码（400 / 401），
/// 因此需要在返回值里区分，而不是合并成一个布尔值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// 载荷无法解析或缺少必要字段
    Malformed(String),
    /// 签名缺失或不匹配
    BadSignature(String),
}

/// webhook 验签与归一化结果
///
/// 无论载荷多离谱都返回此结构体而非错误，保证适配器对调用方
/// 是「纯函数」：不触碰任何状态，也不决定 HTTP 响应。
#[derive(Debug, Clone)]
pub struct WebhookVerification {
    pub valid: bool,
    pub failure: Option<VerifyFailure>,
    /// 归一化后的订单号（验签失败时为空串）
    pub order_id: String,
    /// 渠道上报金额（最小货币单位；缺失或不可解析时为 0，调用方跳过核对）
    pub amount: i64,
    /// 归一化状态
    pub status: PaymentStatus,
    /// 原样回传的渠道载荷，供审计落库
    pub raw: Value,
}

impl WebhookVerification {
    /// 验签通过
    pub fn ok(order_id: String, amount: i64, status: PaymentStatus, raw: Value) -> Self {
        Self {
            valid: true,
            failure: None,
            order_id,
            amount,
            status,
            raw,
        }
    }

    /// 载荷解析失败
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            failure: Some(VerifyFailure::Malformed(reason.into())),
            order_id: String::new(),
            amount: 0,
            status: PaymentStatus::Pending,
            raw: Value::Null,
        }
    }

    /// 签名校验失败
    pub fn bad_signature(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            failure: Some(VerifyFailure::BadSignature(reason.into())),
            order_id: String::new(),
            amount: 0,
            status: PaymentStatus::Pending,
            raw: Value::Null,
        }
    }

    /// 失败诊断信息
    pub fn error(&self) -> Option<&str> {
        match &self.failure {
            Some(VerifyFailure::Malformed(msg)) | Some(VerifyFailure::BadSignature(msg)) => {
                Some(msg.as_str())
            }
            None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter — 封闭的渠道集合
// ---------------------------------------------------------------------------

/// 支付渠道适配器
///
/// 新增渠道时在此追加变体并在 `ProviderRegistry::from_config` 注册。
pub enum ProviderAdapter {
    Midtrans(MidtransGateway),
    Xendit(XenditGateway),
}

impl ProviderAdapter {
    /// 渠道标签，同时用作 webhook 路径参数与指标 label
    pub fn name(&self) -> &str {
        match self {
            Self::Midtrans(gw) => gw.name(),
            Self::Xendit(gw) => gw.name(),
        }
    }

    /// 创建支付意向
    ///
    /// order_id 为空时返回 `InvalidInput`。
    pub fn create_intent(&self, params: &IntentParams) -> Result<ProviderIntent> {
        if params.order_id.is_empty() {
            return Err(PaymentError::InvalidInput("order_id 不能为空".to_string()));
        }
        match self {
            Self::Midtrans(gw) => gw.create_intent(params),
            Self::Xendit(gw) => gw.create_intent(params),
        }
    }

    /// 校验回调签名并归一化载荷
    pub fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> WebhookVerification {
        match self {
            Self::Midtrans(gw) => gw.verify_webhook(headers, body),
            Self::Xendit(gw) => gw.verify_webhook(headers, body),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// 渠道注册表
///
/// 以渠道标签为 key 解析 webhook 路径参数；未知 key 由调用方
/// 映射为 404。
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<ProviderAdapter>>,
}

impl ProviderRegistry {
    /// 按配置注册全部渠道
    pub fn from_config(config: &PaymentConfig) -> Self {
        let mut adapters = HashMap::new();

        let midtrans = Arc::new(ProviderAdapter::Midtrans(MidtransGateway::new(
            &config.midtrans.server_key,
        )));
        adapters.insert(midtrans.name().to_string(), midtrans);

        let xendit = Arc::new(ProviderAdapter::Xendit(XenditGateway::new(
            &config.xendit.webhook_secret,
        )));
        adapters.insert(xendit.name().to_string(), xendit);

        Self { adapters }
    }

    /// 按渠道标签解析适配器
    pub fn resolve(&self, key: &str) -> Option<Arc<ProviderAdapter>> {
        self.adapters.get(key).cloned()
    }

    /// 已注册的渠道标签列表
    pub fn keys(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// 金额归一化
// ---------------------------------------------------------------------------

/// 将渠道上报的金额字段归一化为最小货币单位整数
///
/// 渠道载荷里金额可能是整数、浮点数或十进制字符串
/// （如 Midtrans 的 `"150000.00"`），统一四舍五入到最近整数。
/// 缺失或不可解析返回 None，由调用方决定是否跳过金额核对。
pub(crate) fn normalize_amount(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().map(|f| f.round() as i64)
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                Some(i)
            } else {
                trimmed.parse::<f64>().ok().map(|f| f.round() as i64)
            }
        }
        _ => None,
    }
}
