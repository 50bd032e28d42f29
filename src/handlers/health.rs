//! 健康检查

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

/// 服务和数据库状态
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.database.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() })),
        ),
        Err(e) => {
            log::error!("❌ 数据库健康检查失败: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "timestamp": Utc::now().to_rfc3339() })),
            )
        }
    }
}
