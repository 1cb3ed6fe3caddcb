//! Public trends listing.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::error;

use crate::app::AppState;
use crate::subject::models::{LinkCard, Tag};

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default = "default_filtered")]
    filtered: bool,
}

fn default_limit() -> i64 {
    10
}

fn default_filtered() -> bool {
    true
}

pub(crate) async fn tags(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Tag>>, StatusCode> {
    state
        .scheduler()
        .tags()
        .top(query.limit, query.filtered)
        .await
        .map(Json)
        .map_err(|err| {
            error!(error = %err, "failed to list trending tags");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub(crate) async fn links(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<LinkCard>>, StatusCode> {
    state
        .scheduler()
        .links()
        .top(query.limit, query.filtered)
        .await
        .map(Json)
        .map_err(|err| {
            error!(error = %err, "failed to list trending links");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
