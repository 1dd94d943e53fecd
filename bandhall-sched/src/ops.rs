//! Mutation orchestration
//!
//! Every schedule/attendance mutation flows through here, and this is
//! the only module that calls the broadcaster. Each function awaits the
//! store before it publishes, so a broadcast can never precede (or
//! survive) a failed persist. A publish that reaches nobody is fine:
//! clients re-fetch on reconnect and converge from persisted state.

use chrono::NaiveDate;
use uuid::Uuid;

use bandhall_common::attendance::{summarize, AttendanceRecord, AttendanceStatus, AttendanceSummary};
use bandhall_common::db::models::{OccurrenceOverride, Rehearsal};
use bandhall_common::events::{RehearsalChangeKind, ScheduleEvent};
use bandhall_common::{time, Error, Result};

use crate::AppState;

async fn load_rehearsal(state: &AppState, id: Uuid) -> Result<Rehearsal> {
    state
        .store
        .rehearsal(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("rehearsal {}", id)))
}

fn publish_rehearsal_change(
    state: &AppState,
    band_id: Uuid,
    rehearsal_id: Uuid,
    kind: RehearsalChangeKind,
    date: Option<NaiveDate>,
) {
    let event = ScheduleEvent::RehearsalChanged {
        band_id,
        rehearsal_id,
        kind,
        date,
        timestamp: time::now(),
    };
    state.broadcaster.publish(band_id, &event);
}

/// Create a rehearsal rule, then notify the band's subscribers
pub async fn create_rehearsal(state: &AppState, rehearsal: Rehearsal) -> Result<Rehearsal> {
    rehearsal.validate()?;
    state.store.insert_rehearsal(&rehearsal).await?;
    publish_rehearsal_change(
        state,
        rehearsal.band_id,
        rehearsal.id,
        RehearsalChangeKind::Created,
        None,
    );
    Ok(rehearsal)
}

/// Replace a rehearsal rule's editable fields.
///
/// Band, creator and creation time are pinned to the stored row; a rule
/// cannot move between bands through an update.
pub async fn update_rehearsal(
    state: &AppState,
    id: Uuid,
    mut updated: Rehearsal,
) -> Result<Rehearsal> {
    let existing = load_rehearsal(state, id).await?;
    updated.id = existing.id;
    updated.band_id = existing.band_id;
    updated.created_by = existing.created_by;
    updated.created_at = existing.created_at;
    updated.updated_at = time::now();
    updated.validate()?;

    state.store.update_rehearsal(&updated).await?;
    publish_rehearsal_change(
        state,
        updated.band_id,
        updated.id,
        RehearsalChangeKind::Updated,
        None,
    );
    Ok(updated)
}

/// Delete a rehearsal rule (and, via the schema, its exceptions,
/// overrides and attendance)
pub async fn delete_rehearsal(state: &AppState, id: Uuid) -> Result<()> {
    let existing = load_rehearsal(state, id).await?;
    state.store.delete_rehearsal(id).await?;
    publish_rehearsal_change(
        state,
        existing.band_id,
        id,
        RehearsalChangeKind::Deleted,
        None,
    );
    Ok(())
}

/// Suppress the occurrence generated on `date`
pub async fn cancel_occurrence(state: &AppState, id: Uuid, date: NaiveDate) -> Result<()> {
    let existing = load_rehearsal(state, id).await?;
    state.store.add_cancelled_date(id, date).await?;
    publish_rehearsal_change(
        state,
        existing.band_id,
        id,
        RehearsalChangeKind::OccurrenceCancelled,
        Some(date),
    );
    Ok(())
}

/// Remove an exception date again
pub async fn restore_occurrence(state: &AppState, id: Uuid, date: NaiveDate) -> Result<()> {
    let existing = load_rehearsal(state, id).await?;
    state.store.remove_cancelled_date(id, date).await?;
    publish_rehearsal_change(
        state,
        existing.band_id,
        id,
        RehearsalChangeKind::CancellationRemoved,
        Some(date),
    );
    Ok(())
}

/// Record a per-occurrence time/location override
pub async fn set_override(state: &AppState, ov: OccurrenceOverride) -> Result<()> {
    let existing = load_rehearsal(state, ov.rehearsal_id).await?;
    ov.validate()?;
    state.store.upsert_override(&ov).await?;
    publish_rehearsal_change(
        state,
        existing.band_id,
        ov.rehearsal_id,
        RehearsalChangeKind::OccurrenceOverridden,
        Some(ov.date),
    );
    Ok(())
}

/// Record one member's status for one occurrence and return the
/// refreshed summary
pub async fn set_attendance(
    state: &AppState,
    rehearsal_id: Uuid,
    date: NaiveDate,
    member_id: Uuid,
    status: AttendanceStatus,
) -> Result<AttendanceSummary> {
    let existing = load_rehearsal(state, rehearsal_id).await?;
    let record = AttendanceRecord {
        rehearsal_id,
        date,
        member_id,
        status,
        updated_at: time::now(),
    };
    state.store.set_attendance(&record).await?;

    let records = state
        .store
        .attendance_for_occurrence(rehearsal_id, date)
        .await?;
    let summary = summarize(&records);

    let event = ScheduleEvent::AttendanceChanged {
        band_id: existing.band_id,
        rehearsal_id,
        date,
        member_id,
        status,
        summary: summary.clone(),
        timestamp: time::now(),
    };
    state.broadcaster.publish(existing.band_id, &event);
    Ok(summary)
}
