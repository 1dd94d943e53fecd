//! Attendance records and per-occurrence summaries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A member's response for one occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Attending,
    Declined,
    Tentative,
    NoResponse,
}

impl AttendanceStatus {
    /// Storage representation (matches the wire representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attending => "attending",
            AttendanceStatus::Declined => "declined",
            AttendanceStatus::Tentative => "tentative",
            AttendanceStatus::NoResponse => "no_response",
        }
    }

    /// Parse the storage representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "attending" => Ok(AttendanceStatus::Attending),
            "declined" => Ok(AttendanceStatus::Declined),
            "tentative" => Ok(AttendanceStatus::Tentative),
            "no_response" => Ok(AttendanceStatus::NoResponse),
            other => Err(Error::InvalidInput(format!(
                "unknown attendance status '{}'",
                other
            ))),
        }
    }
}

/// One member's recorded response for one occurrence.
///
/// One record per (rehearsal, occurrence date, member); last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub rehearsal_id: Uuid,
    /// Calendar date of the occurrence in the rule's canonical offset
    pub date: NaiveDate,
    pub member_id: Uuid,
    pub status: AttendanceStatus,
    pub updated_at: DateTime<Utc>,
}

/// Per-member entry in an occurrence summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub member_id: Uuid,
    pub status: AttendanceStatus,
}

/// Folded attendance counts for one occurrence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub attending: usize,
    pub declined: usize,
    pub tentative: usize,
    pub no_response: usize,
    pub responses: Vec<MemberResponse>,
}

/// Fold a set of per-member records into a summary for one occurrence.
///
/// Pure function over the record set; callers pass the records of a
/// single occurrence. Responses are ordered by member id so the output
/// is deterministic regardless of query order.
pub fn summarize(records: &[AttendanceRecord]) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for record in records {
        match record.status {
            AttendanceStatus::Attending => summary.attending += 1,
            AttendanceStatus::Declined => summary.declined += 1,
            AttendanceStatus::Tentative => summary.tentative += 1,
            AttendanceStatus::NoResponse => summary.no_response += 1,
        }
        summary.responses.push(MemberResponse {
            member_id: record.member_id,
            status: record.status,
        });
    }
    summary.responses.sort_by_key(|r| r.member_id);
    summary
}
