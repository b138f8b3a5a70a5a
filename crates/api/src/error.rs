//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CatalogError, DomainError, InvalidAmount, OrderError};
use saga::{ErrorKind, SagaError};
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// No usable identity on the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Identity present but not allowed here.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Domain rule violation.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Saga execution error.
    #[error(transparent)]
    Saga(#[from] SagaError),
    /// Storage error outside the saga.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: String) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Order(_) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Catalog(_) | DomainError::Reservation(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match (&err, err.kind()) {
        (SagaError::SagaNotFound(_), _) => (StatusCode::NOT_FOUND, err.to_string()),
        (SagaError::InvalidState { .. }, _) => (StatusCode::CONFLICT, err.to_string()),
        (_, ErrorKind::ClientInput | ErrorKind::Payment) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        (_, ErrorKind::Internal) => internal(err.to_string()),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        StoreError::DuplicateProduct(_) => (StatusCode::CONFLICT, err.to_string()),
        StoreError::VariantNotFound { .. } | StoreError::InsufficientStock { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => internal(err.to_string()),
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<InvalidAmount> for ApiError {
    fn from(err: InvalidAmount) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Malformed or mistyped JSON bodies are client errors with the usual body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
