//! HTTP surface over [`TtsService`].

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServiceConfig;
use crate::service::TtsService;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TtsService>,
    /// Most files accepted by one `/process_samples` request.
    pub max_samples: usize,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(service: TtsService, config: &ServiceConfig) -> Self {
        Self {
            service: Arc::new(service),
            max_samples: config.max_samples,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::models))
        .route("/generate", post(handlers::generate))
        .route("/clone", post(handlers::clone_voice))
        .route("/audio/:filename", get(handlers::audio))
        .route("/process_samples", post(handlers::process_samples))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
