//! Conversion callback route
//!
//! Called by the remote service, unauthenticated. The body is always `{}`:
//! 200 when the job output was installed, 500 otherwise.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::sanitize::decode_param;
use crate::features::FeatureState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub id: Option<String>,
    pub url: Option<String>,
}

pub fn callback_routes(path: &str) -> Router<FeatureState> {
    Router::new().route(path, get(complete_job))
}

fn callback_response(completed: bool) -> Response {
    let status = if completed {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({}))).into_response()
}

#[tracing::instrument(skip_all)]
async fn complete_job(
    State(state): State<FeatureState>,
    params: Option<Query<CallbackParams>>,
) -> Response {
    let Some(Query(params)) = params else {
        tracing::warn!("Callback with malformed query string");
        return callback_response(false);
    };

    let id = state.stripper.strip(params.id.as_deref().unwrap_or_default());
    let url = state
        .stripper
        .strip(&decode_param(params.url.as_deref().unwrap_or_default()));

    if id.is_empty() || url.is_empty() {
        tracing::warn!("Callback without job id or status url");
        return callback_response(false);
    }

    let completed = state.resolver.handle(&id, &url).await;
    tracing::info!(job_id = %id, completed, "Conversion callback handled");
    callback_response(completed)
}
