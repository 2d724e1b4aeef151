use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentline_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, blocks) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg, None),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            AppError::Core(err) => match err {
                CoreError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
                CoreError::PricingInputError(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "PRICING_INPUT_ERROR", msg, None)
                }
                CoreError::DiscountError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "DISCOUNT_ERROR", msg, None),
                CoreError::PaymentError(msg) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_ERROR", msg, None),
                CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
                CoreError::ConflictError { message, blocks } => {
                    (StatusCode::CONFLICT, "CONFLICT", message, Some(blocks))
                }
                err @ CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string(), None)
                }
                err @ (CoreError::SchedulingError(_)
                | CoreError::StorageError(_)
                | CoreError::InternalError(_)) => {
                    tracing::error!("Internal Server Error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal Server Error".to_string(),
                        None,
                    )
                }
            },
        };

        let body = match blocks {
            Some(blocks) => json!({ "error": message, "code": code, "blocks": blocks }),
            None => json!({ "error": message, "code": code }),
        };

        (status, Json(body)).into_response()
    }
}
