use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::Json;
use bearer_auth::AuthError;
use http::StatusCode;
use log::{debug, error};

use crate::models::ErrorBody;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a message and status code
    pub fn new<S: ToString>(message: S, status_code: StatusCode) -> Self {
        Self {
            message: message.to_string(),
            status_code,
        }
    }

    /// Not Found (404) with the generic message
    pub fn not_found() -> Self {
        Self::new("Not found", StatusCode::NOT_FOUND)
    }

    /// Unprocessable Entity (422) with the generic message
    pub fn unprocessable() -> Self {
        Self::new("unprocessable", StatusCode::UNPROCESSABLE_ENTITY)
    }

    pub fn method_not_allowed() -> Self {
        Self::new("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            success: false,
            error: self.status_code.as_u16(),
            message: self.message,
        };
        (self.status_code, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            // Provider outages are not the caller's business
            AuthError::KeyFetch(cause) => {
                error!("Unable to verify token, signing keys unavailable: {cause}");
                Self::new("Unable to verify token", err.status_code())
            }
            _ => Self::new(err.to_string(), err.status_code()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => {
                debug!("Drink {id} not found");
                Self::not_found()
            }
            StoreError::DuplicateTitle(_) | StoreError::Invalid(_) => {
                debug!("Rejected drink: {err}");
                Self::unprocessable()
            }
            StoreError::Serialization(_) | StoreError::Database(_) => {
                error!("Store operation failed: {err}");
                Self::unprocessable()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self::unprocessable()
    }
}
