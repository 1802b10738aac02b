//! 支付意向与订单迁移集成测试
//!
//! 使用真实 PostgreSQL 验证意向管理器的幂等复用、状态/金额校验，
//! 以及管理端 rank 迁移与用户取消的受限路径。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... \
//!   cargo test --test intent_service_test -- --ignored
//! ```

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use payment_service::error::PaymentError;
use payment_service::models::{OrderStatus, PaymentStatus};
use payment_service::provider::ProviderRegistry;
use payment_service::repository::PaymentRepository;
use payment_service::service::{CreateIntentCommand, IntentService, OrderService};
use storefront_shared::config::PaymentConfig;
use storefront_shared::test_utils::{test_order_id, test_user_id};

// ==================== 测试基础设施 ====================

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup_pool() -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url())
        .await
        .expect("数据库连接失败");

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("迁移执行失败");

    pool
}

fn intent_service(pool: &PgPool) -> IntentService {
    let registry = Arc::new(ProviderRegistry::from_config(&PaymentConfig::default()));
    IntentService::new(pool.clone(), registry, PaymentConfig::default())
}

/// 插入指定状态的订单，返回 order_id
async fn seed_order(pool: &PgPool, status: &str, total: i64) -> String {
    let order_id = test_order_id();
    let user_id = test_user_id();
    sqlx::query(
        r#"
        INSERT INTO orders
            (id, user_id, email, status, subtotal, discount, tax, shipping_fee, total)
        VALUES ($1, $2, $3, $4, $5, 0, 0, 0, $5)
        "#,
    )
    .bind(&order_id)
    .bind(&user_id)
    .bind(format!("{user_id}@example.com"))
    .bind(status)
    .bind(total)
    .execute(pool)
    .await
    .expect("插入测试订单失败");
    order_id
}

fn command(order_id: &str, provider: &str, amount: i64) -> CreateIntentCommand {
    CreateIntentCommand {
        order_id: order_id.to_string(),
        provider: provider.to_string(),
        amount,
        channel: Some("qris".to_string()),
    }
}

async fn payment_count(pool: &PgPool, order_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .expect("查询支付单数量失败")
}

// ==================== 意向管理测试 ====================

/// 创建意向：恰好一条支付单 + 一条审计流水，金额取订单应付总额
#[tokio::test]
#[ignore]
async fn test_create_intent_persists_payment_and_event() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    let payment = service.create_intent(command(&order_id, "midtrans", 0)).await.unwrap();

    assert_eq!(payment.order_id, order_id);
    assert_eq!(payment.provider, "midtrans");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, 150_000);
    assert!(payment.token.is_some());
    assert!(payment.redirect_url.is_some());
    assert!(payment.expires_at.is_some());

    assert_eq!(payment_count(&pool, &order_id).await, 1);

    let repo = PaymentRepository::new(pool.clone());
    let events = repo.list_events(&payment.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, PaymentStatus::Pending);
}

/// 幂等复用：活跃意向存在时二次创建返回同一条支付单，不新增行
#[tokio::test]
#[ignore]
async fn test_create_intent_reuses_active_payment() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    let first = service.create_intent(command(&order_id, "midtrans", 0)).await.unwrap();
    let second = service.create_intent(command(&order_id, "midtrans", 0)).await.unwrap();

    assert_eq!(first.id, second.id, "活跃意向应被复用");
    assert_eq!(payment_count(&pool, &order_id).await, 1);
}

/// 金额不一致 -> InvalidInput，不产生任何支付单
#[tokio::test]
#[ignore]
async fn test_create_intent_amount_mismatch_rejected() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    let err = service
        .create_intent(command(&order_id, "midtrans", 140_000))
        .await
        .expect_err("金额不一致应拒绝");

    assert!(matches!(err, PaymentError::InvalidInput(_)));
    assert_eq!(payment_count(&pool, &order_id).await, 0);
}

/// 订单不在待支付状态 -> InvalidState
#[tokio::test]
#[ignore]
async fn test_create_intent_requires_pending_payment_order() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PAID", 150_000).await;
    let err = service
        .create_intent(command(&order_id, "midtrans", 0))
        .await
        .expect_err("非待支付订单应拒绝");

    assert!(matches!(err, PaymentError::InvalidState(_)));
}

/// 最近支付单已 PAID -> AlreadyPaid
#[tokio::test]
#[ignore]
async fn test_create_intent_rejects_already_paid() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, provider, status, amount)
        VALUES ($1, $2, 'midtrans', 'PAID', 150000)
        "#,
    )
    .bind(format!("pay-{}", uuid::Uuid::new_v4()))
    .bind(&order_id)
    .execute(&pool)
    .await
    .unwrap();

    let err = service
        .create_intent(command(&order_id, "midtrans", 0))
        .await
        .expect_err("已支付订单应拒绝新意向");
    assert!(matches!(err, PaymentError::AlreadyPaid(_)));
}

/// 过期意向不复用：终态/过期支付单存在时创建新行
#[tokio::test]
#[ignore]
async fn test_create_intent_replaces_expired_payment() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    // 已过期的 PENDING 意向
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, provider, status, amount, expires_at, created_at)
        VALUES ($1, $2, 'midtrans', 'PENDING', 150000, NOW() - INTERVAL '1 minute',
                NOW() - INTERVAL '20 minutes')
        "#,
    )
    .bind(format!("pay-{}", uuid::Uuid::new_v4()))
    .bind(&order_id)
    .execute(&pool)
    .await
    .unwrap();

    let payment = service.create_intent(command(&order_id, "xendit", 0)).await.unwrap();
    assert_eq!(payment.provider, "xendit");
    assert_eq!(payment_count(&pool, &order_id).await, 2, "应创建新支付单而非复活旧行");
}

/// 未知渠道 -> ProviderNotFound
#[tokio::test]
#[ignore]
async fn test_create_intent_unknown_provider() {
    let pool = setup_pool().await;
    let service = intent_service(&pool);

    let order_id = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    let err = service
        .create_intent(command(&order_id, "stripe", 0))
        .await
        .expect_err("未知渠道应拒绝");
    assert!(matches!(err, PaymentError::ProviderNotFound(_)));
}

// ==================== 订单迁移测试 ====================

/// 管理端正向迁移放行，回退与 CANCELED 目标拒绝
#[tokio::test]
#[ignore]
async fn test_admin_transition_rank_gate() {
    let pool = setup_pool().await;
    let service = OrderService::new(pool.clone());

    let order_id = seed_order(&pool, "PAID", 150_000).await;

    // 正向：PAID -> PACKED
    let order = service.admin_transition(&order_id, OrderStatus::Packed).await.unwrap();
    assert_eq!(order.status, OrderStatus::Packed);

    // 回退：PACKED -> PAID 拒绝
    let err = service
        .admin_transition(&order_id, OrderStatus::Paid)
        .await
        .expect_err("回退应拒绝");
    assert!(matches!(err, PaymentError::InvalidTransition { .. }));

    // CANCELED 的 rank 低于一切，任何当前状态下都拒绝
    let err = service
        .admin_transition(&order_id, OrderStatus::Canceled)
        .await
        .expect_err("管理端取消应拒绝");
    assert!(matches!(err, PaymentError::InvalidTransition { .. }));
}

/// 用户取消：仅待支付阶段允许
#[tokio::test]
#[ignore]
async fn test_user_cancel_only_pending_payment() {
    let pool = setup_pool().await;
    let service = OrderService::new(pool.clone());

    let pending = seed_order(&pool, "PENDING_PAYMENT", 150_000).await;
    let order = service.cancel_by_user(&pending).await.unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);

    let paid = seed_order(&pool, "PAID", 150_000).await;
    let err = service
        .cancel_by_user(&paid)
        .await
        .expect_err("已支付订单不可用户取消");
    assert!(matches!(err, PaymentError::InvalidState(_)));
}

/// 订单不存在 -> OrderNotFound
#[tokio::test]
#[ignore]
async fn test_transition_missing_order() {
    let pool = setup_pool().await;
    let service = OrderService::new(pool.clone());

    let err = service
        .admin_transition("ord-missing", OrderStatus::Paid)
        .await
        .expect_err("不存在的订单应 404");
    assert!(matches!(err, PaymentError::OrderNotFound(_)));
}
