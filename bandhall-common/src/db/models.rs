//! Database models

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recurrence::RecurrenceSpec;
use crate::{time, Error, Result};

/// One persisted rehearsal series.
///
/// A non-recurring rehearsal is a rule with `recurrence: None`.
/// `start_time`/`end_time` are the first occurrence; every generated
/// occurrence keeps the same duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rehearsal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Canonical fixed offset (minutes east of UTC) used for all
    /// calendar-date comparisons on this rule
    pub tz_offset_minutes: i32,
    pub band_id: Uuid,
    pub created_by: Uuid,
    pub recurrence: Option<RecurrenceSpec>,
    /// Dates whose generated occurrence is suppressed, in the canonical
    /// offset. O(exceptions) storage, never O(occurrences).
    pub cancelled_dates: BTreeSet<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rehearsal {
    /// Duration shared by every occurrence of the series
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Calendar date of the first occurrence in the canonical offset
    pub fn start_date(&self) -> NaiveDate {
        time::local_date(self.start_time, self.tz_offset_minutes)
    }

    /// Check the data-model invariants. Called on save and before
    /// expansion.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("title must not be empty".into()));
        }
        if self.end_time <= self.start_time {
            return Err(Error::InvalidInput(
                "end_time must be after start_time".into(),
            ));
        }
        if self.tz_offset_minutes.abs() >= 24 * 60 {
            return Err(Error::InvalidInput(format!(
                "tz_offset_minutes {} out of range",
                self.tz_offset_minutes
            )));
        }
        if let Some(recurrence) = &self.recurrence {
            recurrence.validate()?;
        }
        Ok(())
    }

    /// Whether the first occurrence has fully ended by `at`
    pub fn is_in_past(&self, at: DateTime<Utc>) -> bool {
        self.end_time < at
    }

    /// Whether the first occurrence is underway at `at`
    pub fn is_in_progress(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at <= self.end_time
    }
}

/// Per-occurrence replacement for a single generated instance.
///
/// Keyed by the occurrence's calendar date; unset fields fall back to
/// the generated value. Sparse patch over the series, O(overrides)
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceOverride {
    pub rehearsal_id: Uuid,
    /// Date of the generated occurrence being overridden, in the rule's
    /// canonical offset
    pub date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

impl OccurrenceOverride {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(Error::InvalidInput(
                    "override end_time must be after start_time".into(),
                ));
            }
        }
        if self.start_time.is_none() && self.end_time.is_none() && self.location.is_none() {
            return Err(Error::InvalidInput("override replaces nothing".into()));
        }
        Ok(())
    }
}

/// A band (minimal: referenced entity, managed elsewhere)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Band {
    pub id: Uuid,
    pub name: String,
}

/// A member (minimal: referenced entity, managed elsewhere)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rehearsal() -> Rehearsal {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        Rehearsal {
            id: Uuid::new_v4(),
            title: "Tuesday practice".into(),
            description: None,
            location: Some("Room 2".into()),
            start_time: start,
            end_time: start + Duration::hours(2),
            tz_offset_minutes: 0,
            band_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            recurrence: None,
            cancelled_dates: BTreeSet::new(),
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_valid_rehearsal_passes() {
        assert!(rehearsal().validate().is_ok());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut r = rehearsal();
        r.end_time = r.start_time - Duration::minutes(1);
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut r = rehearsal();
        r.end_time = r.start_time;
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_in_progress_window() {
        let r = rehearsal();
        assert!(!r.is_in_progress(r.start_time - Duration::minutes(1)));
        assert!(r.is_in_progress(r.start_time + Duration::hours(1)));
        assert!(r.is_in_past(r.end_time + Duration::minutes(1)));
    }

    #[test]
    fn test_override_must_replace_something() {
        let ov = OccurrenceOverride {
            rehearsal_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            start_time: None,
            end_time: None,
            location: None,
        };
        assert!(ov.validate().is_err());
    }

    #[test]
    fn test_override_inverted_times_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 19, 0, 0).unwrap();
        let ov = OccurrenceOverride {
            rehearsal_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            start_time: Some(start),
            end_time: Some(start - Duration::hours(1)),
            location: None,
        };
        assert!(ov.validate().is_err());
    }
}
