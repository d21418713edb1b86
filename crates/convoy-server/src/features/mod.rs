//! HTTP features of the Convoy server
//!
//! Each feature is a vertical slice with its own routes and, where input
//! needs validating, a `commands/` module.
//!
//! # Features
//!
//! - **conversions**: trigger a conversion of a stored artifact
//! - **callback**: completion notifications from the remote service

pub mod callback;
pub mod conversions;

use axum::Router;
use std::sync::Arc;

use crate::conversion::{CallbackResolver, JobDispatcher};
use crate::storage::ArtifactStore;
use callback::MarkupStripper;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub dispatcher: Arc<JobDispatcher>,
    pub resolver: Arc<CallbackResolver>,
    pub store: Arc<dyn ArtifactStore>,
    pub stripper: MarkupStripper,
}

/// Creates the feature router
///
/// - `/api/v1/conversions` - Conversion trigger
/// - `{callback_path}` - Remote completion callback, outside the API prefix
///   because the remote service is configured with that exact URL
pub fn router(state: FeatureState, callback_path: &str) -> Router<()> {
    Router::new()
        .nest("/api/v1/conversions", conversions::conversions_routes())
        .merge(callback::callback_routes(callback_path))
        .with_state(state)
}
