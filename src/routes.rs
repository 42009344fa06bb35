use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::models::{AttendanceRecord, RegisteredFace},
    error::AppError,
    reconciler::{build_report, Decision, RecognitionEvent, ReportWindow},
    AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFaceRequest {
    name: Option<String>,
    descriptor: Option<Vec<f32>>,
}

pub async fn register_face(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterFaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("name is required".into()))?;
    let descriptor = payload
        .descriptor
        .filter(|descriptor| !descriptor.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("descriptor is required".into()))?;

    let face = RegisteredFace {
        name: name.to_string(),
        descriptor,
        created_at: Utc::now(),
    };

    state.db.upsert_face(&face).await?;
    info!("registered face for {}", face.name);

    Ok((StatusCode::CREATED, Json(face)))
}

pub async fn list_faces(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RegisteredFace>>, AppError> {
    Ok(Json(state.db.list_faces().await?))
}

pub async fn delete_face(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.db.delete_face(&name).await? {
        return Err(AppError::NotFound(format!("no registered face for {name}")));
    }

    info!("deleted registered face for {name}");
    Ok(Json(json!({ "message": format!("face for {name} deleted") })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    name: Option<String>,
    distance: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAttendanceResponse {
    #[serde(flatten)]
    decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<AttendanceRecord>,
}

/// Runs the observation through the cooldown gate. Only an admitted event is
/// persisted; a suppressed or unmatched one is the normal steady-state answer
/// while a subject stays in front of the camera, so it comes back as 200, not
/// as an error.
pub async fn mark_attendance(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MarkAttendanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("name is required".into()))?;
    let distance = payload
        .distance
        .ok_or_else(|| AppError::InvalidArgument("distance is required".into()))?;

    let event = RecognitionEvent {
        name: name.to_string(),
        distance,
        observed_at: Utc::now(),
    };

    match state.reconciler.observe(&event) {
        Decision::Admitted => {
            let record = AttendanceRecord {
                id: Uuid::new_v4().to_string(),
                name: event.name,
                marked_at: event.observed_at,
                distance: event.distance,
            };
            state.db.insert_attendance(&record).await?;
            info!(
                "marked attendance for {} (distance {:.2})",
                record.name, record.distance
            );

            Ok((
                StatusCode::CREATED,
                Json(MarkAttendanceResponse {
                    decision: Decision::Admitted,
                    record: Some(record),
                }),
            ))
        }
        decision => Ok((
            StatusCode::OK,
            Json(MarkAttendanceResponse {
                decision,
                record: None,
            }),
        )),
    }
}

#[derive(Deserialize)]
pub struct AttendanceLogQuery {
    limit: Option<u32>,
}

pub async fn attendance_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttendanceLogQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    // The query parameter may narrow the configured bound, never widen it.
    let limit = query
        .limit
        .unwrap_or(state.config.log_limit)
        .min(state.config.log_limit);

    Ok(Json(state.db.recent_attendance(limit).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCooldownRequest {
    seconds: Option<u64>,
}

pub async fn set_cooldown(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetCooldownRequest>,
) -> Result<impl IntoResponse, AppError> {
    let seconds = payload
        .seconds
        .ok_or_else(|| AppError::InvalidArgument("seconds is required".into()))?;

    state.reconciler.set_cooldown(seconds)?;
    info!("cooldown set to {seconds}s");

    Ok(Json(json!({ "cooldownSeconds": seconds })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReportQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_seconds: u32,
}

pub async fn attendance_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttendanceReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let window = ReportWindow {
        start_at: query.start,
        end_at: query.end,
        interval_seconds: query.interval_seconds,
    };

    let roster = state.db.registered_names().await?;
    let records = state
        .db
        .attendance_between(window.start_at, window.end_at)
        .await?;

    let rows = build_report(&window, &records, &roster)?;
    Ok(Json(rows))
}
