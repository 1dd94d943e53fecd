//! Rehearsal schedule endpoints
//!
//! Reads expand the stored rules directly; they never touch the
//! broadcaster. Mutations go through `ops` (persist, then publish).

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bandhall_common::attendance::{summarize, AttendanceRecord, AttendanceSummary};
use bandhall_common::db::models::{OccurrenceOverride, Rehearsal};
use bandhall_common::recurrence::{expand, RecurrenceSpec};
use bandhall_common::{time, Error, Result};

use super::{error_response, ErrorResponse};
use crate::{ops, AppState};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Query window for calendar reads, both bounds inclusive
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Rehearsal fields as submitted by clients (REST and WebSocket share
/// this shape)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RehearsalForm {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub tz_offset_minutes: i32,
    pub band_id: Uuid,
    pub created_by: Uuid,
    /// Recurrence wire shape; deserialization validates it, so a form
    /// that parses cannot carry an invalid rule
    #[serde(default)]
    pub recurrence: Option<RecurrenceSpec>,
    #[serde(default)]
    pub cancelled_dates: Vec<NaiveDate>,
}

impl RehearsalForm {
    /// Materialize the form into a rehearsal with the given identity
    pub fn into_rehearsal(self, id: Uuid, now: DateTime<Utc>) -> Rehearsal {
        Rehearsal {
            id,
            title: self.title,
            description: self.description,
            location: self.location,
            start_time: self.start_time,
            end_time: self.end_time,
            tz_offset_minutes: self.tz_offset_minutes,
            band_id: self.band_id,
            created_by: self.created_by,
            recurrence: self.recurrence,
            cancelled_dates: self.cancelled_dates.into_iter().collect(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One expanded occurrence as returned to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceView {
    pub rehearsal_id: Uuid,
    pub band_id: Uuid,
    pub title: String,
    pub sequence: u32,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub overridden: bool,
    /// Whether the occurrence is underway at query time
    pub live: bool,
    pub attendance: AttendanceSummary,
}

#[derive(Debug, Serialize)]
pub struct OccurrencesResponse {
    pub occurrences: Vec<OccurrenceView>,
}

/// Expand one rule over the window and merge overrides + attendance
fn assemble_views(
    rehearsal: &Rehearsal,
    overrides: &std::collections::BTreeMap<NaiveDate, OccurrenceOverride>,
    attendance: &[AttendanceRecord],
    window: &WindowQuery,
    now: DateTime<Utc>,
) -> Result<Vec<OccurrenceView>> {
    let mut by_date: HashMap<NaiveDate, Vec<AttendanceRecord>> = HashMap::new();
    for record in attendance {
        by_date.entry(record.date).or_default().push(record.clone());
    }

    let views = expand(rehearsal, overrides, window.from, window.to)?
        .map(|occurrence| OccurrenceView {
            rehearsal_id: occurrence.rehearsal_id,
            band_id: occurrence.band_id,
            title: rehearsal.title.clone(),
            sequence: occurrence.sequence,
            date: occurrence.date,
            start_time: occurrence.start_time,
            end_time: occurrence.end_time,
            location: occurrence.location.clone(),
            overridden: occurrence.overridden,
            live: occurrence.is_live(now),
            attendance: summarize(
                by_date.get(&occurrence.date).map(Vec::as_slice).unwrap_or(&[]),
            ),
        })
        .collect();
    Ok(views)
}

async fn expand_rehearsal(
    state: &AppState,
    rehearsal: &Rehearsal,
    window: &WindowQuery,
    now: DateTime<Utc>,
) -> Result<Vec<OccurrenceView>> {
    let overrides = state.store.overrides_for(rehearsal.id).await?;
    let attendance = state.store.attendance_for_rehearsal(rehearsal.id).await?;
    assemble_views(rehearsal, &overrides, &attendance, window, now)
}

/// GET /api/rehearsals/:id/occurrences?from&to
pub async fn get_occurrences(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
) -> std::result::Result<Json<OccurrencesResponse>, ApiError> {
    let rehearsal = state
        .store
        .rehearsal(id)
        .await
        .and_then(|r| r.ok_or_else(|| Error::NotFound(format!("rehearsal {}", id))))
        .map_err(error_response)?;

    let occurrences = expand_rehearsal(&state, &rehearsal, &window, time::now())
        .await
        .map_err(error_response)?;
    Ok(Json(OccurrencesResponse { occurrences }))
}

/// GET /api/bands/:band_id/rehearsals?from&to
///
/// All of the band's rules expanded over the window, merged and ordered
/// by start. A band with no rehearsals yields an empty list.
pub async fn get_band_occurrences(
    State(state): State<AppState>,
    Path(band_id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
) -> std::result::Result<Json<OccurrencesResponse>, ApiError> {
    let rehearsals = state
        .store
        .rehearsals_for_band(band_id)
        .await
        .map_err(error_response)?;

    let now = time::now();
    let mut occurrences = Vec::new();
    for rehearsal in &rehearsals {
        occurrences.extend(
            expand_rehearsal(&state, rehearsal, &window, now)
                .await
                .map_err(error_response)?,
        );
    }
    // Overlaps between rules are allowed and surfaced, not resolved
    occurrences.sort_by_key(|o| o.start_time);
    Ok(Json(OccurrencesResponse { occurrences }))
}

/// POST /api/rehearsals
pub async fn create_rehearsal(
    State(state): State<AppState>,
    Json(form): Json<RehearsalForm>,
) -> std::result::Result<(StatusCode, Json<Rehearsal>), ApiError> {
    let rehearsal = form.into_rehearsal(Uuid::new_v4(), time::now());
    let created = ops::create_rehearsal(&state, rehearsal)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/rehearsals/:id
pub async fn update_rehearsal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<RehearsalForm>,
) -> std::result::Result<Json<Rehearsal>, ApiError> {
    let updated = ops::update_rehearsal(&state, id, form.into_rehearsal(id, time::now()))
        .await
        .map_err(error_response)?;
    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

/// DELETE /api/rehearsals/:id
pub async fn delete_rehearsal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    ops::delete_rehearsal(&state, id).await.map_err(error_response)?;
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct CancellationRequest {
    pub date: NaiveDate,
}

/// POST /api/rehearsals/:id/cancellations
pub async fn add_cancellation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancellationRequest>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    ops::cancel_occurrence(&state, id, request.date)
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// DELETE /api/rehearsals/:id/cancellations/:date
pub async fn remove_cancellation(
    State(state): State<AppState>,
    Path((id, date)): Path<(Uuid, NaiveDate)>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    ops::restore_occurrence(&state, id, date)
        .await
        .map_err(error_response)?;
    Ok(ok())
}

/// Per-occurrence replacement fields; unset fields keep the generated
/// value
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideForm {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
}

/// PUT /api/rehearsals/:id/occurrences/:date
pub async fn put_override(
    State(state): State<AppState>,
    Path((id, date)): Path<(Uuid, NaiveDate)>,
    Json(form): Json<OverrideForm>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    ops::set_override(
        &state,
        OccurrenceOverride {
            rehearsal_id: id,
            date,
            start_time: form.start_time,
            end_time: form.end_time,
            location: form.location,
        },
    )
    .await
    .map_err(error_response)?;
    Ok(ok())
}
