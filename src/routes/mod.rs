use axum::{routing::get, Router};

use crate::state::AppState;

pub mod calculations;
pub mod dashboard;
pub mod expenses;
pub mod granite;
pub mod health;
pub mod ledger;
pub mod lookups;
pub mod receivables;
pub mod sales;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(lookups::router())
        .merge(ledger::router())
        .merge(receivables::router())
        .merge(granite::router())
        .merge(sales::router())
        .merge(expenses::router())
        .merge(calculations::router())
        .merge(dashboard::router())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::v1_router;
    use crate::{config::AppConfig, error::NOT_CONFIGURED_MESSAGE, state::AppState};

    fn app() -> Router {
        let state = AppState {
            config: Arc::new(AppConfig::default()),
            db_pool: None,
        };
        Router::new().nest("/api", v1_router()).with_state(state)
    }

    async fn send(method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn lists_are_empty_without_a_database() {
        for uri in [
            "/api/customers",
            "/api/consignments?customer_id=550e8400-e29b-41d4-a716-446655440000",
            "/api/granite/sales",
            "/api/granite/buyers/top?limit=3&sort_by=profit",
            "/api/expenses",
        ] {
            let (status, body) = send(Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, json!([]), "{uri}");
        }
    }

    #[tokio::test]
    async fn writes_fail_without_a_database() {
        let (status, body) = send(
            Method::POST,
            "/api/customers",
            Some(json!({ "name": "Sri Venkateswara Granites" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": NOT_CONFIGURED_MESSAGE }));

        let (status, _) = send(
            Method::DELETE,
            "/api/granite/sales?id=550e8400-e29b-41d4-a716-446655440000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn aggregates_are_zeroed_without_a_database() {
        let (status, body) = send(Method::GET, "/api/receivables", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["receivable_total"], json!(0.0));
        assert_eq!(body["overpaid"], json!(false));

        let (status, body) = send(Method::GET, "/api/dashboard?from=2024-01-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["net_operating_profit"], json!(0.0));
        assert_eq!(body["top_buyers"], json!([]));
    }

    #[tokio::test]
    async fn validation_runs_before_the_database_check() {
        let (status, body) = send(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "customer_id": "550e8400-e29b-41d4-a716-446655440000",
                "date": "2024-05-01",
                "mode": "RTGS",
                "amount": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(
            Method::POST,
            "/api/consignments",
            Some(json!({
                "customer_id": "550e8400-e29b-41d4-a716-446655440000",
                "date": "2024-05-01",
                "total": 900,
                "rtgs_expected": 600,
                "cash_expected": 400
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn new_blocks_cannot_skip_the_pipeline() {
        let (status, body) = send(
            Method::POST,
            "/api/granite/blocks",
            Some(json!({
                "consignment_id": "550e8400-e29b-41d4-a716-446655440000",
                "block_no": "B1",
                "gross_measurement": 12,
                "net_measurement": 10,
                "status": "SOLD"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|error| error.contains("RAW")));

        // A valid RAW block gets past validation and stops at the missing database.
        let (status, _) = send(
            Method::POST,
            "/api/granite/blocks",
            Some(json!({
                "consignment_id": "550e8400-e29b-41d4-a716-446655440000",
                "block_no": "B1",
                "gross_measurement": 12,
                "net_measurement": 10
            })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let (status, _) = send(
            Method::POST,
            "/api/customers",
            Some(json!({ "name": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let (status, body) = send(
            Method::POST,
            "/api/transactions",
            Some(json!({ "customer_id": "x", "date": "2024-05-01", "mode": "UPI", "amount": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn preview_computes_without_a_database() {
        let (status, body) = send(
            Method::POST,
            "/api/consignment-calculations/preview",
            Some(json!({
                "total_blocks": 10,
                "avg_meters_per_block": 2,
                "cost_per_meter": 1000
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_sqft"], json!(6_000.0));
        assert_eq!(body["total_cost"], json!(20_000.0));

        let (status, _) = send(
            Method::POST,
            "/api/consignment-calculations/preview",
            Some(json!({ "polish_percentage": 70, "laputra_percentage": 40 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_missing_database() {
        let (status, body) = send(Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["database"], json!("not_configured"));
    }
}
