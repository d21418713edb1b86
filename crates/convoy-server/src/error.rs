//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::ErrorResponse;
use crate::conversion::DispatchError;

/// Errors returned by the JSON API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Conversion failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dispatch(DispatchError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Dispatch(DispatchError::OutputNotAllowed(_)) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::UnknownOwner(_)) => StatusCode::NOT_FOUND,
            ApiError::Dispatch(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::NotFound(message) => ("NOT_FOUND", message.clone()),
            ApiError::Validation(message) => ("VALIDATION_ERROR", message.clone()),
            ApiError::Unavailable(message) => ("NOT_CONFIGURED", message.clone()),
            ApiError::Dispatch(DispatchError::Remote(e)) => {
                tracing::error!("Remote conversion error: {}", e);
                ("REMOTE_ERROR", e.to_string())
            },
            ApiError::Dispatch(e @ DispatchError::OutputNotAllowed(_)) => {
                ("VALIDATION_ERROR", e.to_string())
            },
            ApiError::Dispatch(e @ DispatchError::UnknownOwner(_)) => ("NOT_FOUND", e.to_string()),
            ApiError::Dispatch(e) => {
                tracing::error!("Dispatch error: {}", e);
                ("INTERNAL_ERROR", "An internal error occurred".to_string())
            },
            ApiError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                ("STORAGE_ERROR", "A storage error occurred".to_string())
            },
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
