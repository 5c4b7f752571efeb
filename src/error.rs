use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const NOT_CONFIGURED_MESSAGE: &str = "Database is not configured.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database is not configured.")]
    NotConfigured,
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConfigured | Self::Dependency(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Constraint violations (class 23) are caller mistakes and keep the store
/// message; everything else is a dependency failure.
pub fn map_db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Database query failed");

    match &error {
        sqlx::Error::Database(db_error)
            if db_error
                .code()
                .is_some_and(|code| code.starts_with("23")) =>
        {
            AppError::BadRequest(db_error.message().to_string())
        }
        sqlx::Error::Database(db_error) => AppError::Dependency(db_error.message().to_string()),
        sqlx::Error::RowNotFound => AppError::NotFound("Record not found.".to_string()),
        other => AppError::Dependency(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{map_db_error, AppError, NOT_CONFIGURED_MESSAGE};
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(
            AppError::BadRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::NotConfigured.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::NotConfigured.to_string(), NOT_CONFIGURED_MESSAGE);
    }

    #[tokio::test]
    async fn renders_error_body() {
        let response = AppError::BadRequest("amount must be positive.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], "amount must be positive.");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_db_error(sqlx::Error::RowNotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            map_db_error(sqlx::Error::PoolTimedOut),
            AppError::Dependency(_)
        ));
    }
}
