use std::time::Duration;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.read_pool() {
        Some(pool) => {
            // Bounded so the health check answers even when the first connect hangs.
            match tokio::time::timeout(
                Duration::from_secs(3),
                sqlx::query("SELECT 1").fetch_one(pool),
            )
            .await
            {
                Ok(Ok(_)) => "ok",
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Health check query failed");
                    "error"
                }
                Err(_) => {
                    tracing::error!("Health check query timed out (3s)");
                    "timeout"
                }
            }
        }
        None => "not_configured",
    };

    let status = if database == "error" || database == "timeout" {
        "degraded"
    } else {
        "ok"
    };
    Json(json!({
        "status": status,
        "service": state.config.app_name,
        "database": database,
        "now": Utc::now().to_rfc3339(),
    }))
}
