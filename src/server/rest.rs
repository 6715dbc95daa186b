//! Meeting and attendee REST surface

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::meetings::{AttendeeRecord, MeetingRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttendeeRequest {
    pub attendee_name: String,
}

#[derive(Debug, Serialize)]
pub struct MeetingResponse {
    pub meeting: MeetingRecord,
    pub attendee: AttendeeRecord,
}

/// `POST /api/meetings` creates a meeting and its first attendee.
pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAttendeeRequest>,
) -> Result<Json<MeetingResponse>, StatusCode> {
    let attendee = AttendeeRecord::new(&request.attendee_name);
    let mut meeting = MeetingRecord::new();
    meeting.attendees.push(attendee.clone());

    if let Err(error) = state.store.create_meeting(meeting.clone()).await {
        error!(%error, "failed to persist meeting");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    info!(
        meeting_id = %meeting.meeting_id,
        attendee = %attendee.attendee_name,
        "meeting created"
    );
    Ok(Json(MeetingResponse { meeting, attendee }))
}

/// `POST /api/meetings/{id}/attendees` adds an attendee to an existing
/// meeting, or 404s.
pub async fn add_attendee(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    Json(request): Json<CreateAttendeeRequest>,
) -> Result<Json<MeetingResponse>, StatusCode> {
    let attendee = AttendeeRecord::new(&request.attendee_name);

    let added = state
        .store
        .add_attendee(&meeting_id, attendee.clone())
        .await
        .map_err(|error| {
            error!(%error, "failed to persist attendee");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !added {
        return Err(StatusCode::NOT_FOUND);
    }

    let meeting = state
        .store
        .get_meeting(&meeting_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    info!(
        meeting_id = %meeting_id,
        attendee = %attendee.attendee_name,
        "attendee added"
    );
    Ok(Json(MeetingResponse { meeting, attendee }))
}

/// `GET /api/health` liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
