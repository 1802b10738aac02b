//! 支付结算服务错误类型定义
//!
//! 错误分类与 HTTP 状态码的映射关系是渠道重试行为的契约：
//! 4xx 表示请求本身有问题（渠道不应原样重试），
//! 409 表示重复触达或状态冲突，5xx 才值得渠道按退避策略重试。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use storefront_shared::error::CoreError;

/// 支付结算服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    // 请求校验
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("非法输入: {0}")]
    InvalidInput(String),
    #[error("金额不一致: 支付单金额 {expected}, 渠道上报 {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    // 鉴权
    #[error("webhook 签名校验失败: {0}")]
    SignatureInvalid(String),

    // 资源不存在
    #[error("支付渠道不存在: {0}")]
    ProviderNotFound(String),
    #[error("订单不存在: {0}")]
    OrderNotFound(String),
    #[error("支付单不存在: order_id={0}")]
    PaymentNotFound(String),

    // 状态冲突
    #[error("重复的 webhook 回调")]
    DuplicateWebhook,
    #[error("订单已支付: {0}")]
    AlreadyPaid(String),
    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("订单状态不允许该操作: {0}")]
    InvalidState(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Redis错误: {0}")]
    Redis(String),
    #[error("Kafka错误: {0}")]
    Kafka(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl PaymentError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidInput(_) | Self::AmountMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }

            Self::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,

            Self::ProviderNotFound(_) | Self::OrderNotFound(_) | Self::PaymentNotFound(_) => {
                StatusCode::NOT_FOUND
            }

            Self::DuplicateWebhook
            | Self::AlreadyPaid(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidState(_) => StatusCode::CONFLICT,

            Self::Database(_) | Self::Redis(_) | Self::Kafka(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            Self::DuplicateWebhook => "DUPLICATE_WEBHOOK",
            Self::AlreadyPaid(_) => "ALREADY_PAID",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Redis(e) => {
                tracing::error!(error = %e, "Redis 操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Kafka(e) => {
                tracing::error!(error = %e, "Kafka 操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for PaymentError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从共享库基础设施错误转换
impl From<CoreError> for PaymentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => Self::Database(e),
            CoreError::Redis(e) => Self::Redis(e.to_string()),
            CoreError::Kafka(msg) => Self::Kafka(msg),
            CoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    // ---- 辅助函数 ----

    /// 构造所有错误变体及其期望的 (StatusCode, error_code) 映射。
    /// 使用表驱动方式避免逐个变体写重复断言，同时保证新增变体时只需在一处维护。
    fn all_error_variants() -> Vec<(PaymentError, StatusCode, &'static str)> {
        vec![
            // 请求校验类：渠道或调用方需要修正请求后重发
            (PaymentError::Validation("order_id is required".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (PaymentError::InvalidInput("amount mismatch".into()), StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            (PaymentError::AmountMismatch { expected: 150_000, actual: 140_000 }, StatusCode::BAD_REQUEST, "AMOUNT_MISMATCH"),
            // 鉴权：验签失败统一 401
            (PaymentError::SignatureInvalid("bad hmac".into()), StatusCode::UNAUTHORIZED, "SIGNATURE_INVALID"),
            // 资源不存在类
            (PaymentError::ProviderNotFound("stripe".into()), StatusCode::NOT_FOUND, "PROVIDER_NOT_FOUND"),
            (PaymentError::OrderNotFound("ord-404".into()), StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            (PaymentError::PaymentNotFound("ord-404".into()), StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            // 冲突类：409 表示请求合法但与当前状态冲突，渠道收到后应停止原样重试
            (PaymentError::DuplicateWebhook, StatusCode::CONFLICT, "DUPLICATE_WEBHOOK"),
            (PaymentError::AlreadyPaid("ord-001".into()), StatusCode::CONFLICT, "ALREADY_PAID"),
            (PaymentError::InvalidTransition { from: "DELIVERED".into(), to: "PACKED".into() }, StatusCode::CONFLICT, "INVALID_TRANSITION"),
            (PaymentError::InvalidState("order not awaiting payment".into()), StatusCode::CONFLICT, "INVALID_STATE"),
            // 系统级错误：统一 500，渠道按退避策略重试
            (PaymentError::Redis("connection refused".into()), StatusCode::INTERNAL_SERVER_ERROR, "REDIS_ERROR"),
            (PaymentError::Kafka("broker down".into()), StatusCode::INTERNAL_SERVER_ERROR, "KAFKA_ERROR"),
            (PaymentError::Internal("unexpected state".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    // ---- 表驱动：全量 status_code / error_code 覆盖 ----

    /// 状态码是渠道重试行为的契约，必须逐一锁定
    #[test]
    fn test_all_variants_status_code() {
        for (error, expected_status, label) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "状态码不匹配: variant={label}"
            );
        }
    }

    /// 错误码是 API 契约的一部分，任何变更都是破坏性变更
    #[test]
    fn test_all_variants_error_code() {
        for (error, _status, expected_code) in all_error_variants() {
            assert_eq!(
                error.error_code(),
                expected_code,
                "错误码不匹配: expected={expected_code}"
            );
        }
    }

    /// 确保表驱动用例覆盖了除 Database 外的全部变体
    /// （Database 依赖 sqlx::Error，单独用例验证）
    #[test]
    fn test_all_variants_covered_in_table() {
        assert_eq!(
            all_error_variants().len(),
            14,
            "表驱动用例数量与变体总数不一致，可能新增了变体但未更新测试"
        );
    }

    #[test]
    fn test_database_error_mapping() {
        let err = PaymentError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, PaymentError::Database(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    // ---- Display 测试 ----

    /// Display 输出作为 API 响应的 message 返回，必须携带定位上下文
    #[test]
    fn test_display_contains_context() {
        assert!(PaymentError::OrderNotFound("ord-42".into()).to_string().contains("ord-42"));
        assert!(PaymentError::ProviderNotFound("stripe".into()).to_string().contains("stripe"));
        let msg = PaymentError::AmountMismatch { expected: 150_000, actual: 140_000 }.to_string();
        assert!(msg.contains("150000"));
        assert!(msg.contains("140000"));
        let msg = PaymentError::InvalidTransition { from: "PAID".into(), to: "CANCELED".into() }.to_string();
        assert!(msg.contains("PAID"));
        assert!(msg.contains("CANCELED"));
    }

    // ---- IntoResponse 测试 ----

    /// 验证响应体结构完整（success/code/message/data 四字段）
    #[tokio::test]
    async fn test_into_response_body_structure() {
        let response = PaymentError::DuplicateWebhook.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体失败");
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes).expect("响应体不是合法 JSON");

        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("DUPLICATE_WEBHOOK"));
        assert!(!body["message"].as_str().unwrap_or("").is_empty());
        assert!(body["data"].is_null());
    }

    /// 系统级错误的响应消息不应泄露内部细节
    #[tokio::test]
    async fn test_system_errors_hide_internal_details() {
        let error = PaymentError::Redis("redis://10.0.0.1:6379 connection refused".into());
        let response = error.into_response();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体失败");
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        let message = body["message"].as_str().unwrap();

        assert!(
            !message.contains("redis://10.0.0.1:6379"),
            "系统错误消息泄露了内部细节: {message}"
        );
        assert!(message.contains("服务内部错误"));
    }

    /// 业务错误的响应消息应保留原始描述
    #[tokio::test]
    async fn test_business_errors_preserve_display_message() {
        let error = PaymentError::AmountMismatch { expected: 150_000, actual: 99_000 };
        let response = error.into_response();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体失败");
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        let message = body["message"].as_str().unwrap();

        assert!(message.contains("150000"));
        assert!(message.contains("99000"));
    }

    // ---- From<CoreError> 转换测试 ----

    #[test]
    fn test_from_core_error() {
        let err: PaymentError = CoreError::Kafka("send failed".into()).into();
        assert!(matches!(err, PaymentError::Kafka(_)));

        let err: PaymentError = CoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, PaymentError::Database(_)));

        let err: PaymentError = CoreError::Validation("bad input".into()).into();
        assert!(matches!(err, PaymentError::Validation(_)));

        // 未显式映射的变体回退到 Internal，消息保留便于排查
        let err: PaymentError = CoreError::Internal("oom".into()).into();
        match err {
            PaymentError::Internal(msg) => assert!(msg.contains("oom")),
            other => panic!("期望 Internal，实际: {:?}", other),
        }
    }

    #[test]
    fn test_from_validation_errors() {
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        let mut field_error = ValidationError::new("length");
        field_error.message = Some("order_id 不能为空".into());
        errors.add("order_id", field_error);

        let err: PaymentError = errors.into();
        match &err {
            PaymentError::Validation(msg) => assert!(msg.contains("order_id")),
            other => panic!("期望 Validation 变体，实际: {:?}", other),
        }
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
