use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::webhook::VerifyError;

/// Failures from the user store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("counter increment would overflow")]
    CounterOverflow,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures while fetching or reading a third-party page.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("{0:#}")]
    Network(#[from] anyhow::Error),

    #[error("selector '{0}' never appeared")]
    SelectorMissing(String),

    #[error("could not serialize products: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything a handler can answer with besides success.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("expected markup not found: {0}")]
    SelectorMissing(String),

    #[error("webhook verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Network(_) | ApiError::SelectorMissing(_) | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Verification(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UsernameTaken(_) => ApiError::Conflict(e.to_string()),
            StoreError::CounterOverflow => ApiError::Validation(e.to_string()),
            StoreError::Database(_) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        match e {
            ScrapeError::SelectorMissing(selector) => ApiError::SelectorMissing(selector),
            other => ApiError::Network(other.to_string()),
        }
    }
}

/// Body returned for every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
