use axum::{Json, extract::State};
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
}

pub(crate) async fn ready(State(_state): State<AppState>) -> Json<HealthReport> {
    // The engine store is in-process and the subject pool connects lazily,
    // so readiness equals liveness here.
    Json(HealthReport { status: "ready" })
}

pub(crate) async fn live(State(_state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport { status: "live" })
}
