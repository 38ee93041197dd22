//! HTTP handlers mapping REST verbs onto control-channel signals.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chronod_domain::Error;
use serde::Serialize;
use serde_json::json;

use crate::control::{ControlReply, ControlRequest};
use crate::schedule::{JobDefinition, Schedule};

use super::AppState;

pub async fn healthz() -> &'static str {
    "chronod is running"
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::MalformedExpression { .. }
        | Error::OutOfRange { .. }
        | Error::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::UnknownSignal(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = error_status(&err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// `GET /schedule` — maps to `scheduleGetList`.
pub async fn get_schedule(State(state): State<AppState>) -> Response {
    match state.control.send(ControlRequest::GetSchedule).await {
        Ok(ControlReply::Schedule(schedule)) => Json(schedule).into_response(),
        Ok(ControlReply::Error(err)) => error_response(err),
        Ok(_) => unreachable_reply(),
        Err(err) => error_response(err),
    }
}

/// `PUT /schedule` — maps to `replaceRunningSchedule`.
pub async fn replace_schedule(
    State(state): State<AppState>,
    Json(jobs): Json<Vec<JobDefinition>>,
) -> Response {
    let proposed = Schedule::unvalidated(jobs);
    match state
        .control
        .send(ControlRequest::ReplaceSchedule(proposed.clone()))
        .await
    {
        Ok(ControlReply::ReplaceAck) => (StatusCode::OK, Json(proposed)).into_response(),
        Ok(ControlReply::Error(err)) => error_response(err),
        Ok(_) => unreachable_reply(),
        Err(err) => error_response(err),
    }
}

#[derive(Serialize)]
pub struct RunningJobView {
    pub token: String,
    pub label: String,
    pub command: String,
    pub locking: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// `GET /jobs/running` — maps to `runningjobGetList`.
pub async fn get_running_jobs(State(state): State<AppState>) -> Response {
    match state.control.send(ControlRequest::GetRunningJobs).await {
        Ok(ControlReply::RunningJobs(jobs)) => {
            let views: Vec<RunningJobView> = jobs
                .into_iter()
                .map(|r| RunningJobView {
                    token: r.token.to_string(),
                    label: r.job.label,
                    command: r.job.command,
                    locking: r.job.locking,
                    started_at: r.started_at,
                })
                .collect();
            Json(views).into_response()
        }
        Ok(ControlReply::Error(err)) => error_response(err),
        Ok(_) => unreachable_reply(),
        Err(err) => error_response(err),
    }
}

/// `POST /shutdown` — maps to `shutdown`.
pub async fn shutdown(State(state): State<AppState>) -> Response {
    match state.control.send(ControlRequest::Shutdown).await {
        Ok(ControlReply::ShutdownAck) => {
            state.shutdown_notify.notify_one();
            StatusCode::ACCEPTED.into_response()
        }
        Ok(ControlReply::Error(err)) => error_response(err),
        Ok(_) => unreachable_reply(),
        Err(err) => error_response(err),
    }
}

fn unreachable_reply() -> Response {
    tracing::error!("control channel returned a reply that did not match the request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal protocol mismatch" })),
    )
        .into_response()
}
