use crate::store::StoreError;
use crate::utils::retry::Retryable;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Already signed in today")]
    AlreadySignedIn,
    #[error("Session already signed out")]
    AlreadySignedOut,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Stable machine-readable code for the `code` field of error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadySignedIn => "already_signed_in",
            ServiceError::AlreadySignedOut => "already_signed_out",
            ServiceError::Store(StoreError::NotFound(_)) => "not_found",
            ServiceError::Store(StoreError::Conflict(_)) => "conflict",
            ServiceError::Store(StoreError::Unavailable(_)) => "unavailable",
            ServiceError::Store(StoreError::Unexpected(_)) => "internal",
        }
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Store(StoreError::Unavailable(_)))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "already_signed_in")]
    pub code: String,
    #[schema(example = "Already signed in today")]
    pub message: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) | ServiceError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::AlreadySignedIn
            | ServiceError::AlreadySignedOut
            | ServiceError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ServiceError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(StoreError::Unexpected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ServiceError::Store(StoreError::Unexpected(_)) => {
                tracing::error!(error = ?self, "Unexpected store error");
                "Internal Server Error".to_string()
            }
            ServiceError::Store(StoreError::Unavailable(_)) => {
                tracing::error!(error = %self, "Store unavailable");
                "Service temporarily unavailable".to_string()
            }
            ServiceError::Store(StoreError::Conflict(_)) => {
                tracing::warn!(error = %self, "Store rejected a conflicting write");
                "The request conflicts with existing data".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            code: self.code().to_string(),
            message,
        })
    }
}
