//! Admin listing and manual refresh.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::scheduler::{JobContext, RefreshOutcome};
use crate::subject::models::{LinkProvider, Tag};
use crate::subject::repository::ReviewFilter;

#[derive(Debug, Deserialize)]
pub(crate) struct FilterQuery {
    status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: String,
}

fn parse_filter(query: &FilterQuery) -> Result<ReviewFilter, (StatusCode, Json<ErrorBody>)> {
    // Unknown filter keys fail fast instead of silently listing everything.
    query.status.parse().map_err(|err: crate::subject::repository::FilterError| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        )
    })
}

pub(crate) async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Tag>>, (StatusCode, Json<ErrorBody>)> {
    let filter = parse_filter(&query)?;
    state.tag_repo().filter(filter).await.map(Json).map_err(|err| {
        error!(error = %err, "failed to filter tags");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "tag listing failed".to_string(),
            }),
        )
    })
}

pub(crate) async fn list_link_providers(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<LinkProvider>>, (StatusCode, Json<ErrorBody>)> {
    let filter = parse_filter(&query)?;
    state
        .link_repo()
        .filter_providers(filter)
        .await
        .map(Json)
        .map_err(|err| {
            error!(error = %err, "failed to filter link providers");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "provider listing failed".to_string(),
                }),
            )
        })
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshReport {
    job_id: Uuid,
    status: &'static str,
}

pub(crate) async fn refresh(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshReport>), StatusCode> {
    let job_id = Uuid::new_v4();
    let job = JobContext::new(job_id, Utc::now());

    match state.scheduler().run_refresh(job).await {
        Ok(RefreshOutcome::Completed { .. }) => Ok((
            StatusCode::OK,
            Json(RefreshReport {
                job_id,
                status: "completed",
            }),
        )),
        Ok(RefreshOutcome::AlreadyRunning) => Ok((
            StatusCode::CONFLICT,
            Json(RefreshReport {
                job_id,
                status: "already_running",
            }),
        )),
        Err(err) => {
            error!(%job_id, error = %err, "manual trend refresh failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
