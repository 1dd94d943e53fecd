//! Attendance endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use bandhall_common::attendance::{AttendanceStatus, AttendanceSummary};

use super::{error_response, ErrorResponse};
use crate::{ops, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceForm {
    pub member_id: Uuid,
    pub status: AttendanceStatus,
}

/// PUT /api/rehearsals/:id/occurrences/:date/attendance
///
/// Upserts the member's response for that occurrence and returns the
/// refreshed summary. The same summary rides on the
/// `attendance_changed` event the band's subscribers receive.
pub async fn put_attendance(
    State(state): State<AppState>,
    Path((id, date)): Path<(Uuid, NaiveDate)>,
    Json(form): Json<AttendanceForm>,
) -> std::result::Result<Json<AttendanceSummary>, (StatusCode, Json<ErrorResponse>)> {
    let summary = ops::set_attendance(&state, id, date, form.member_id, form.status)
        .await
        .map_err(error_response)?;
    Ok(Json(summary))
}
