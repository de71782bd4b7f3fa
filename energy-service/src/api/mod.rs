//! HTTP surface: upload, rollups, statistics and upload history.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub use auth::{AuthenticatedOwner, IdentityProvider, StaticTokenIdentity};
pub use error::ApiError;

use crate::{
    aggregation::AggregationEngine, pipeline::IngestPipeline, statistics::StatisticsEngine, store::EnergyStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EnergyStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub ingest: Arc<IngestPipeline>,
    pub aggregation: Arc<AggregationEngine>,
    pub statistics: Arc<StatisticsEngine>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EnergyStore>,
        identity: Arc<dyn IdentityProvider>,
        rate_per_kwh: f64,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            ingest: Arc::new(IngestPipeline::new(store.clone())),
            aggregation: Arc::new(AggregationEngine::new(store.clone())),
            statistics: Arc::new(StatisticsEngine::new(store.clone(), rate_per_kwh)),
            store,
            identity,
            max_upload_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route(
            "/upload-csv/",
            post(handlers::upload_csv).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/energy-data/", get(handlers::energy_data))
        .route("/statistics/", get(handlers::statistics))
        .route("/uploads/", get(handlers::uploads))
        .with_state(state)
}
