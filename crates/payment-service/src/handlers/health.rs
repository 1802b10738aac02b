//! 健康检查处理器

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::state::AppState;

/// 存活/就绪探针
///
/// GET /health
///
/// 逐项检查 PostgreSQL 与 Redis 连通性；任一依赖不可用时
/// 返回 503，负载均衡据此摘除实例。
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let redis_ok = state.cache.health_check().await.is_ok();

    let status = if db_ok && redis_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
        "redis": if redis_ok { "up" } else { "down" },
    });

    (status, Json(body))
}
