pub(crate) mod admin;
pub(crate) mod health;
pub(crate) mod ingest;
pub(crate) mod metrics;
pub(crate) mod trends;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/ingest/use", post(ingest::record_use))
        .route("/v1/trends/tags", get(trends::tags))
        .route("/v1/trends/links", get(trends::links))
        .route("/v1/admin/tags", get(admin::list_tags))
        .route("/v1/admin/links/providers", get(admin::list_link_providers))
        .route("/v1/admin/trends/refresh", post(admin::refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
