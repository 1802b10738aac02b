//! 支付结算服务入口
//!
//! 负责订单与外部支付渠道的对账闭环：支付意向、webhook 结算、
//! 订单状态迁移与领域事件发布。

use std::sync::Arc;
use std::time::Duration;

use payment_service::provider::ProviderRegistry;
use payment_service::service::{IntentService, OrderService, SettlementService};
use payment_service::{routes, state::AppState};
use storefront_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    events::KafkaEventPublisher,
    kafka::KafkaProducer,
    observability,
};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/{default,环境,服务}.toml + STOREFRONT_ 环境变量
    let config = AppConfig::load("payment-service").unwrap_or_default();

    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting payment-service on {}", config.server_addr());

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;
    let cache = Arc::new(Cache::new(&config.redis)?);

    let producer = KafkaProducer::new(&config.kafka)?;
    let publisher = Arc::new(KafkaEventPublisher::new(producer));

    // 渠道注册表：封闭的适配器集合，按配置装配凭证
    let registry = Arc::new(ProviderRegistry::from_config(&config.payment));
    info!(providers = ?registry.keys(), "Payment providers registered");

    let settlement = Arc::new(SettlementService::new(
        db.pool().clone(),
        cache.clone(),
        registry.clone(),
        publisher,
        Duration::from_secs(config.payment.replay_ttl_seconds),
    ));
    let intents = Arc::new(IntentService::new(
        db.pool().clone(),
        registry.clone(),
        config.payment.clone(),
    ));
    let orders = Arc::new(OrderService::new(db.pool().clone()));

    let state = AppState::new(db.pool().clone(), cache, settlement, intents, orders);

    // 30 秒兜底超时：渠道侧的回调超时普遍在 30-60 秒，
    // 服务端必须先于渠道放弃，避免渠道重试叠加在慢请求上
    let app = routes::api_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("payment-service listening on {}", config.server_addr());
    axum::serve(listener, app).await?;

    Ok(())
}
