//! Usage-event ingestion.
//!
//! Called synchronously from the processing path that discovers a new use.
//! Cheap: a couple of store writes, no scoring. Transient store failures
//! surface as 503 so the caller's own retry policy can take over.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::AppState;
use crate::subject::models::{ActorId, SubjectId};
use crate::util::error::is_retryable;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SubjectKindParam {
    Tag,
    Link,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UseEvent {
    kind: SubjectKindParam,
    subject_id: SubjectId,
    actor_id: ActorId,
    /// False for re-shares; they still count toward history but never
    /// refresh a tag's freshness marker.
    #[serde(default = "default_original")]
    original: bool,
    at: Option<DateTime<Utc>>,
}

fn default_original() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub(crate) struct IngestReport {
    status: &'static str,
}

pub(crate) async fn record_use(
    State(state): State<AppState>,
    Json(event): Json<UseEvent>,
) -> Result<(StatusCode, Json<IngestReport>), StatusCode> {
    let at = event.at.unwrap_or_else(Utc::now);

    let result = match event.kind {
        SubjectKindParam::Tag => match state.tag_repo().get(event.subject_id).await {
            Ok(Some(tag)) => {
                state
                    .scheduler()
                    .tags()
                    .record_use(&tag, event.actor_id, event.original, at)
                    .await
            }
            Ok(None) => return Err(StatusCode::NOT_FOUND),
            Err(err) => Err(err),
        },
        SubjectKindParam::Link => match state.link_repo().get(event.subject_id).await {
            Ok(Some(link)) => {
                state
                    .scheduler()
                    .links()
                    .record_use(&link, event.actor_id, event.original, at)
                    .await
            }
            Ok(None) => return Err(StatusCode::NOT_FOUND),
            Err(err) => Err(err),
        },
    };

    match result {
        Ok(()) => {
            state.telemetry().record_use();
            Ok((StatusCode::ACCEPTED, Json(IngestReport { status: "recorded" })))
        }
        Err(err) => {
            error!(subject_id = event.subject_id, error = %err, "failed to record use");
            if is_retryable(&err) {
                Err(StatusCode::SERVICE_UNAVAILABLE)
            } else {
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
