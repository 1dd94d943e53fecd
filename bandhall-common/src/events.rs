//! Event types for the bandhall realtime channel
//!
//! Events are published per band through the `EventBroadcaster` and
//! serialized as-is onto the WebSocket wire, so the serde shape here IS
//! the server→client protocol.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attendance::{AttendanceStatus, AttendanceSummary};

/// What kind of schedule mutation a `RehearsalChanged` event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RehearsalChangeKind {
    Created,
    Updated,
    Deleted,
    OccurrenceCancelled,
    CancellationRemoved,
    OccurrenceOverridden,
}

/// Realtime schedule events, one enum for exhaustive matching.
///
/// Subscribers receive only events for bands they have joined. Payloads
/// carry the mutated identifiers, not full state: clients re-fetch the
/// affected window, so a client that reconnects right after a publish
/// converges to the same view as one that received it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleEvent {
    /// A rehearsal rule, exception or override changed
    #[serde(rename_all = "camelCase")]
    RehearsalChanged {
        band_id: Uuid,
        rehearsal_id: Uuid,
        kind: RehearsalChangeKind,
        /// Occurrence date for per-occurrence mutations (cancellation,
        /// override), absent for whole-rule mutations
        #[serde(skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
        /// When the mutation was persisted
        timestamp: DateTime<Utc>,
    },

    /// A member's attendance for one occurrence changed
    #[serde(rename_all = "camelCase")]
    AttendanceChanged {
        band_id: Uuid,
        rehearsal_id: Uuid,
        /// Occurrence date the record applies to
        date: NaiveDate,
        member_id: Uuid,
        status: AttendanceStatus,
        /// Refreshed per-occurrence summary so clients can update
        /// headcounts without a round trip
        summary: AttendanceSummary,
        /// When the mutation was persisted
        timestamp: DateTime<Utc>,
    },
}

impl ScheduleEvent {
    /// Band whose channel this event belongs on
    pub fn band_id(&self) -> Uuid {
        match self {
            ScheduleEvent::RehearsalChanged { band_id, .. } => *band_id,
            ScheduleEvent::AttendanceChanged { band_id, .. } => *band_id,
        }
    }
}
