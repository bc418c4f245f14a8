use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ports::RepositoryError;
use crate::services::PaymentError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Gateway(GatewayError::CircuitBreakerOpen(msg)) => {
                AppError::GatewayUnavailable(msg)
            }
            PaymentError::Gateway(e) => AppError::Gateway(e.to_string()),
            PaymentError::Store(RepositoryError::NotFound(what)) => AppError::NotFound(what),
            PaymentError::Store(RepositoryError::Conflict(what)) => AppError::Conflict(what),
            PaymentError::Store(e) => AppError::Database(e.to_string()),
            PaymentError::Host(e) => AppError::Internal(e.to_string()),
            e @ PaymentError::MissingOriginatingTransaction { .. } => {
                AppError::Conflict(e.to_string())
            }
            e @ PaymentError::TransactionNotFound(_) => AppError::NotFound(e.to_string()),
            e @ PaymentError::PaymentMethodNotFound(_) => AppError::NotFound(e.to_string()),
            PaymentError::InvalidNotification(msg) => AppError::BadRequest(msg),
            PaymentError::InvalidRequest(msg) => AppError::BadRequest(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionKind;
    use uuid::Uuid;

    #[test]
    fn test_missing_originating_is_conflict() {
        let error: AppError = PaymentError::MissingOriginatingTransaction {
            kind: TransactionKind::Void,
            payment_id: Uuid::nil(),
        }
        .into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_circuit_open_is_unavailable() {
        let error: AppError =
            PaymentError::Gateway(GatewayError::CircuitBreakerOpen("open".to_string())).into();
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_malformed_gateway_response_is_bad_gateway() {
        let error: AppError =
            PaymentError::Gateway(GatewayError::MalformedResponse("x".to_string())).into();
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_not_found_variants() {
        let error: AppError = PaymentError::PaymentMethodNotFound(Uuid::nil()).into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        let error: AppError = PaymentError::TransactionNotFound(Uuid::nil()).into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_failure_is_internal() {
        let error: AppError =
            PaymentError::Store(RepositoryError::Database(sqlx::Error::RowNotFound)).into();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_notification_is_bad_request() {
        let error: AppError = PaymentError::InvalidNotification("bad".to_string()).into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_error_response_body_status() {
        let response = AppError::Unauthorized("bad signature".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
