//! 支付渠道 webhook 接入
//!
//! POST /webhooks/payments/{provider}
//!
//! 原始请求体必须原封不动地交给结算协调器——验签对字节敏感，
//! 任何中途的 JSON 重序列化都会破坏签名，因此这里用 `Bytes`
//! 而非 `Json` 提取。

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use crate::error::PaymentError;
use crate::state::AppState;

/// 处理渠道支付回调
///
/// 成功（含「已记录但未触发结算」的情形）统一响应 204 No Content；
/// 失败按 [`PaymentError`] 映射 4xx/5xx，渠道据此决定是否重试。
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, PaymentError> {
    state
        .settlement
        .handle_webhook(&provider, &headers, &body)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
