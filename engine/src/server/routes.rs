//! Request handlers

use super::{ApiError, AppState};
use crate::proctoring::{analyze_audio as audio_stub, now_millis, AudioAnalysis, Frame};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use sdk::types::{
    AnswerSubmission, Attempt, ConnectionStatus, ExamResults, FrameAnalysis, IncidentFlag,
    IncidentRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub(super) struct FrameQuery {
    #[serde(default)]
    candidate_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StartAttemptRequest {
    candidate_id: String,
    #[serde(default = "default_exam_set")]
    exam_set: String,
}

fn default_exam_set() -> String {
    "A".to_string()
}

#[derive(Debug, Deserialize)]
pub(super) struct IncidentReport {
    candidate_id: String,
    #[serde(flatten)]
    incident: IncidentRecord,
}

#[derive(Debug, Serialize)]
pub(super) struct FinishResponse {
    total_score: f64,
    total_max: f64,
    percentage: f64,
}

fn stored(message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
        "timestamp": now_millis(),
    }))
}

pub(super) async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": "proctor",
        "version": env!("CARGO_PKG_VERSION"),
        "detector": state.proctor.has_detector(),
        "ai_grading": state.grader.ai().is_available().await,
    }))
}

pub(super) async fn analyze_frame(
    State(state): State<AppState>,
    Query(query): Query<FrameQuery>,
    body: Bytes,
) -> ApiResult<FrameAnalysis> {
    let frame = Frame::decode(body.to_vec())?;
    let candidate_id = query
        .candidate_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let analysis = state.proctor.analyze_frame(candidate_id, &frame).await?;
    Ok(Json(analysis))
}

pub(super) async fn analyze_audio(body: Bytes) -> Json<AudioAnalysis> {
    Json(audio_stub(&body))
}

/// Connectivity for one candidate. The first poll that sees a stale
/// connection also records a connectivity incident.
pub(super) async fn connection_status(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> Json<ConnectionStatus> {
    let status = state.heartbeat.status(&candidate_id).await;

    if status.flag == Some(IncidentFlag::ConnectivityTimeout)
        && state.heartbeat.claim_timeout_report(&candidate_id).await
    {
        let details = format!("downtime={}s", status.downtime.unwrap_or_default());
        if let Err(e) = state
            .proctor
            .report_incident(&candidate_id, IncidentFlag::ConnectivityTimeout, details)
            .await
        {
            warn!("Could not record connectivity timeout for {}: {}", candidate_id, e);
        }
    }

    Json(status)
}

pub(super) async fn start_attempt(
    State(state): State<AppState>,
    Json(request): Json<StartAttemptRequest>,
) -> ApiResult<Attempt> {
    let attempt = state
        .exams
        .start_attempt(request.candidate_id.trim(), &request.exam_set)
        .await?;
    Ok(Json(attempt))
}

pub(super) async fn submit_answer(
    State(state): State<AppState>,
    Json(submission): Json<AnswerSubmission>,
) -> ApiResult<Value> {
    // the stored record carries the answer key, so it is not echoed back
    state.exams.submit_answer(submission).await?;
    Ok(stored("Answer stored successfully"))
}

pub(super) async fn record_incident(
    State(state): State<AppState>,
    Json(report): Json<IncidentReport>,
) -> ApiResult<Value> {
    state
        .exams
        .record_incident(report.candidate_id.trim(), report.incident)
        .await?;
    Ok(stored("Incident recorded"))
}

pub(super) async fn finish_exam(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> ApiResult<FinishResponse> {
    let summary = state.exams.finish_exam(&candidate_id).await?;
    state.proctor.forget(&candidate_id).await;

    Ok(Json(FinishResponse {
        total_score: summary.total_score,
        total_max: summary.total_max,
        percentage: summary.percentage,
    }))
}

pub(super) async fn results(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> ApiResult<ExamResults> {
    Ok(Json(state.exams.results(&candidate_id).await?))
}
