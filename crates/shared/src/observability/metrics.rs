//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 所有记录函数都是结算链路的旁路钩子：只累计计数，不返回错误。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标（预定义的业务指标）
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "webhook_callbacks_total",
        "Total number of payment webhook callbacks received"
    );
    metrics::describe_counter!(
        "settlements_total",
        "Total number of committed payment settlements"
    );
    metrics::describe_histogram!(
        "settlement_duration_seconds",
        "Webhook settlement duration in seconds"
    );
    metrics::describe_counter!(
        "payment_intents_total",
        "Total number of payment intents created or reused"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次 webhook 回调及其处理结果
///
/// outcome 取值：settled / recorded / rejected / replayed / error
#[inline]
pub fn record_webhook_callback(provider: &str, outcome: &str) {
    metrics::counter!(
        "webhook_callbacks_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录一次已提交的结算
#[inline]
pub fn record_settlement(provider: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "settlements_total",
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "settlement_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// 记录一次支付意向创建/复用
///
/// reused 区分新建意向与幂等复用，两者的比例反映前端重复提交的频率
#[inline]
pub fn record_payment_intent(provider: &str, reused: bool) {
    metrics::counter!(
        "payment_intents_total",
        "provider" => provider.to_string(),
        "reused" => if reused { "true" } else { "false" }
    )
    .increment(1);
}
