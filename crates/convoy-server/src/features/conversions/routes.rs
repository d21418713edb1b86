use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::net::SocketAddr;

use super::commands::{
    handle_create, CreateConversionCommand, CreateConversionError, CreateConversionResponse,
};
use crate::api::ApiResponse;
use crate::error::ApiError;
use crate::features::FeatureState;

pub fn conversions_routes() -> Router<FeatureState> {
    Router::new().route("/", post(create_conversion))
}

/// Trigger a conversion
///
/// POST /conversions
#[tracing::instrument(skip(state, command), fields(origin = %addr.ip()))]
async fn create_conversion(
    State(state): State<FeatureState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(command): Json<CreateConversionCommand>,
) -> Result<Response, ApiError> {
    let response =
        handle_create(&state.dispatcher, state.store.as_ref(), command, addr.ip()).await?;

    let status = match response {
        CreateConversionResponse::Pending { .. } => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::success(response))).into_response())
}

impl From<CreateConversionError> for ApiError {
    fn from(err: CreateConversionError) -> Self {
        match err {
            CreateConversionError::SourceRequired
            | CreateConversionError::AmbiguousSource
            | CreateConversionError::FormatRequired
            | CreateConversionError::OutputPathRequired => ApiError::Validation(err.to_string()),
            CreateConversionError::OwnerNotFound(_) | CreateConversionError::SourceNotFound(_) => {
                ApiError::NotFound(err.to_string())
            },
            CreateConversionError::NotConfigured => ApiError::Unavailable(err.to_string()),
            CreateConversionError::Dispatch(e) => ApiError::Dispatch(e),
            CreateConversionError::Storage(e) => ApiError::Storage(e),
        }
    }
}
