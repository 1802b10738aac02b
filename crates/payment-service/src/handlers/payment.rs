//! 支付意向 API 处理器
//!
//! 面向下单链路的内部接口：为待支付订单创建/复用渠道支付意向。

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::PaymentError;
use crate::models::{Payment, PaymentStatus};
use crate::service::CreateIntentCommand;
use crate::state::AppState;

use super::ApiResponse;

/// 创建支付意向请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_id: String,
    /// 目标渠道标签（midtrans / xendit）
    #[validate(length(min = 1, max = 32))]
    pub provider: String,
    /// 显式声明的金额；缺省按订单应付总额
    pub amount: Option<i64>,
    /// 渠道内支付方式，透传
    pub channel: Option<String>,
}

/// 支付意向响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentDto {
    pub payment_id: String,
    pub order_id: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub token: Option<String>,
    pub redirect_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentIntentDto {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            provider: payment.provider,
            status: payment.status,
            amount: payment.amount,
            token: payment.token,
            redirect_url: payment.redirect_url,
            expires_at: payment.expires_at,
        }
    }
}

/// 创建或复用支付意向
///
/// POST /payments/intents
pub async fn create_intent(
    State(state): State<AppState>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Json<ApiResponse<PaymentIntentDto>>, PaymentError> {
    req.validate()?;

    let cmd = CreateIntentCommand {
        order_id: req.order_id,
        provider: req.provider,
        amount: req.amount.unwrap_or(0),
        channel: req.channel,
    };

    let payment = state.intents.create_intent(cmd).await?;
    Ok(Json(ApiResponse::success(payment.into())))
}
