//! Occurrence expansion
//!
//! `expand` walks the generated series of a rehearsal rule in start
//! order, applies exceptions and per-date overrides, and yields the
//! occurrences whose start falls inside the requested window. The walk
//! is lazy and stops as soon as the generated series passes the window
//! end, so far-future windows never iterate past their own bounds.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{OccurrenceOverride, Rehearsal};
use crate::recurrence::{RecurrenceEnd, RecurrenceSpec};
use crate::{time, Error, Result};

/// One concrete, dated instance derived from a rule.
///
/// Identity is (rehearsal_id, date); `sequence` is the index of the
/// occurrence among the non-cancelled members of the series, counting
/// from 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub rehearsal_id: Uuid,
    pub band_id: Uuid,
    pub sequence: u32,
    /// Calendar date in the rule's canonical offset
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    /// Whether a per-occurrence override replaced the generated values
    pub overridden: bool,
}

impl Occurrence {
    /// Whether this occurrence is underway at `at`
    pub fn is_live(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at <= self.end_time
    }
}

/// Expand a rule into the occurrences whose start falls in
/// `[window_start, window_end]`, ordered by start ascending.
///
/// Pure and deterministic: re-calling with identical arguments yields an
/// identical sequence. Fails with `InvalidRule` when the rule violates
/// its invariants, `InvalidInput` when the window is inverted.
pub fn expand<'a>(
    rehearsal: &'a Rehearsal,
    overrides: &'a BTreeMap<NaiveDate, OccurrenceOverride>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<ExpandIter<'a>> {
    if window_start > window_end {
        return Err(Error::InvalidInput(
            "window start must not exceed window end".into(),
        ));
    }
    rehearsal.validate()?;

    let start_date = rehearsal.start_date();
    let local_time = rehearsal
        .start_time
        .with_timezone(&time::fixed_offset(rehearsal.tz_offset_minutes))
        .time();

    let (cursor, interval, weekdays, end) = match &rehearsal.recurrence {
        None => (
            Cursor::Single { emitted: false },
            1,
            BTreeSet::new(),
            RecurrenceEnd::Never,
        ),
        Some(RecurrenceSpec::Daily { interval, end }) => (
            Cursor::Daily { step: 0 },
            *interval,
            BTreeSet::new(),
            *end,
        ),
        Some(RecurrenceSpec::Weekly {
            interval,
            weekdays,
            end,
        }) => (
            Cursor::Weekly { date: start_date },
            *interval,
            weekdays.clone(),
            *end,
        ),
        Some(RecurrenceSpec::Monthly { interval, end }) => (
            Cursor::Monthly { step: 0 },
            *interval,
            BTreeSet::new(),
            *end,
        ),
    };

    Ok(ExpandIter {
        rehearsal,
        overrides,
        window_start,
        window_end,
        duration: rehearsal.duration(),
        start_date,
        anchor_sunday: sunday_of(start_date),
        local_time,
        interval,
        weekdays,
        end,
        cursor,
        yielded: 0,
        done: false,
    })
}

/// Sunday on or before the given date (weekly interval blocks are
/// Sunday-aligned, matching the wire's 0 = Sunday numbering)
fn sunday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

enum Cursor {
    Single { emitted: bool },
    Daily { step: u32 },
    Weekly { date: NaiveDate },
    Monthly { step: u32 },
}

/// Lazy iterator over the windowed occurrences of one rule
pub struct ExpandIter<'a> {
    rehearsal: &'a Rehearsal,
    overrides: &'a BTreeMap<NaiveDate, OccurrenceOverride>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    duration: Duration,
    start_date: NaiveDate,
    anchor_sunday: NaiveDate,
    local_time: NaiveTime,
    interval: u32,
    weekdays: BTreeSet<u8>,
    end: RecurrenceEnd,
    cursor: Cursor,
    /// Non-cancelled occurrences produced so far; cancelled dates do
    /// not consume a slot toward `RecurrenceEnd::Count`
    yielded: u32,
    done: bool,
}

impl ExpandIter<'_> {
    /// Next generated series date, in series order. `None` when the
    /// series itself is exhausted (or date arithmetic overflows).
    fn next_date(&mut self) -> Option<NaiveDate> {
        match &mut self.cursor {
            Cursor::Single { emitted } => {
                if *emitted {
                    None
                } else {
                    *emitted = true;
                    Some(self.start_date)
                }
            }
            Cursor::Daily { step } => {
                let days = (*step as u64).checked_mul(self.interval as u64)?;
                let date = self.start_date.checked_add_days(Days::new(days))?;
                *step = step.checked_add(1)?;
                Some(date)
            }
            Cursor::Monthly { step } => {
                let months = step.checked_mul(self.interval)?;
                // Anchored to the original start date so a day-31 anchor
                // clamps per-month instead of drifting after a short month
                let date = self
                    .start_date
                    .checked_add_months(Months::new(months))?;
                *step = step.checked_add(1)?;
                Some(date)
            }
            Cursor::Weekly { date } => loop {
                let candidate = *date;
                let week_index =
                    (sunday_of(candidate) - self.anchor_sunday).num_days() / 7;
                let rem = week_index % self.interval as i64;
                if rem != 0 {
                    // Jump to the start of the next selected week block
                    let skip_days = (self.interval as i64 - rem) * 7;
                    *date = sunday_of(candidate)
                        .checked_add_days(Days::new(skip_days as u64))?;
                    continue;
                }
                *date = candidate.checked_add_days(Days::new(1))?;
                let weekday = candidate.weekday().num_days_from_sunday() as u8;
                if self.weekdays.contains(&weekday) {
                    return Some(candidate);
                }
            },
        }
    }
}

impl Iterator for ExpandIter<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.done {
            return None;
        }
        loop {
            let Some(date) = self.next_date() else {
                self.done = true;
                return None;
            };

            // Termination is checked before yielding the candidate, so
            // the limit is inclusive of the last valid occurrence
            match self.end {
                RecurrenceEnd::Until(until) if date > until => {
                    self.done = true;
                    return None;
                }
                RecurrenceEnd::Count(count) if self.yielded >= count => {
                    self.done = true;
                    return None;
                }
                _ => {}
            }

            let generated_start =
                time::from_local(date.and_time(self.local_time), self.rehearsal.tz_offset_minutes);

            // Stop as soon as the generated series passes the window end,
            // independent of the termination condition
            if generated_start > self.window_end {
                self.done = true;
                return None;
            }

            // Exceptions are matched by canonical-offset calendar date
            // and do not consume a count slot
            if self.rehearsal.cancelled_dates.contains(&date) {
                continue;
            }

            let sequence = self.yielded;
            self.yielded += 1;

            let (start_time, end_time, location, overridden) =
                match self.overrides.get(&date) {
                    Some(ov) => {
                        let start = ov.start_time.unwrap_or(generated_start);
                        let end = ov.end_time.unwrap_or(start + self.duration);
                        let location = ov
                            .location
                            .clone()
                            .or_else(|| self.rehearsal.location.clone());
                        (start, end, location, true)
                    }
                    None => (
                        generated_start,
                        generated_start + self.duration,
                        self.rehearsal.location.clone(),
                        false,
                    ),
                };

            // Window filter on the (possibly overridden) start
            if start_time < self.window_start || start_time > self.window_end {
                continue;
            }

            return Some(Occurrence {
                rehearsal_id: self.rehearsal.id,
                band_id: self.rehearsal.band_id,
                sequence,
                date,
                start_time,
                end_time,
                location,
                overridden,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    fn rehearsal(recurrence: Option<RecurrenceSpec>) -> Rehearsal {
        let start = utc(2024, 1, 1, 18, 0); // a Monday
        Rehearsal {
            id: Uuid::new_v4(),
            title: "Practice".into(),
            description: None,
            location: Some("Studio A".into()),
            start_time: start,
            end_time: start + Duration::hours(2),
            tz_offset_minutes: 0,
            band_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            recurrence,
            cancelled_dates: BTreeSet::new(),
            created_at: start,
            updated_at: start,
        }
    }

    fn weekly_mondays() -> Option<RecurrenceSpec> {
        Some(RecurrenceSpec::Weekly {
            interval: 1,
            weekdays: BTreeSet::from([1]), // Monday
            end: RecurrenceEnd::Never,
        })
    }

    fn collect(
        r: &Rehearsal,
        overrides: &BTreeMap<NaiveDate, OccurrenceOverride>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Occurrence> {
        expand(r, overrides, from, to).unwrap().collect()
    }

    #[test]
    fn test_non_recurring_yields_once_within_window() {
        let r = rehearsal(None);
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 31, 0, 0));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].start_time, r.start_time);
        assert_eq!(got[0].end_time, r.end_time);
        assert_eq!(got[0].sequence, 0);

        let outside = collect(&r, &none, utc(2024, 2, 1, 0, 0), utc(2024, 2, 28, 0, 0));
        assert!(outside.is_empty());
    }

    #[test]
    fn test_weekly_single_weekday_one_interval_unit_yields_one() {
        let r = rehearsal(weekly_mondays());
        let none = BTreeMap::new();
        // one interval unit = one week
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 7, 23, 59));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].date, date(2024, 1, 1));
        assert_eq!(got[0].date.weekday().num_days_from_sunday(), 1);
    }

    #[test]
    fn test_weekly_mondays_example() {
        let r = rehearsal(weekly_mondays());
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 22, 23, 59));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 1),
                date(2024, 1, 8),
                date(2024, 1, 15),
                date(2024, 1, 22),
            ]
        );
        for o in &got {
            assert_eq!(o.start_time.time(), utc(2024, 1, 1, 18, 0).time());
            assert_eq!(o.end_time - o.start_time, r.duration());
        }
        assert_eq!(
            got.iter().map(|o| o.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_cancelled_date_removes_exactly_that_occurrence() {
        let mut r = rehearsal(weekly_mondays());
        r.cancelled_dates.insert(date(2024, 1, 8));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 22, 23, 59));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 15), date(2024, 1, 22)]
        );
    }

    #[test]
    fn test_cancelling_date_not_in_series_is_noop() {
        let mut r = rehearsal(weekly_mondays());
        r.cancelled_dates.insert(date(2024, 1, 9)); // a Tuesday
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 22, 23, 59));
        assert_eq!(got.len(), 4);
    }

    #[test]
    fn test_expand_is_deterministic_and_restartable() {
        let r = rehearsal(weekly_mondays());
        let none = BTreeMap::new();
        let first = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 3, 31, 0, 0));
        let second = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 3, 31, 0, 0));
        assert_eq!(first, second);
    }

    #[test]
    fn test_count_yields_exactly_count_across_unbounded_window() {
        let r = rehearsal(Some(RecurrenceSpec::Weekly {
            interval: 1,
            weekdays: BTreeSet::from([1]),
            end: RecurrenceEnd::Count(5),
        }));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2030, 1, 1, 0, 0));
        assert_eq!(got.len(), 5);
        assert_eq!(got.last().unwrap().date, date(2024, 1, 29));

        // zero beyond them
        let beyond = collect(&r, &none, utc(2024, 2, 1, 0, 0), utc(2030, 1, 1, 0, 0));
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_cancelled_occurrence_does_not_consume_count_slot() {
        let mut r = rehearsal(Some(RecurrenceSpec::Weekly {
            interval: 1,
            weekdays: BTreeSet::from([1]),
            end: RecurrenceEnd::Count(3),
        }));
        r.cancelled_dates.insert(date(2024, 1, 8));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2025, 1, 1, 0, 0));
        // series extends one week past the cancelled date
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 15), date(2024, 1, 22)]
        );
    }

    #[test]
    fn test_monthly_interval_and_count_example() {
        let start = utc(2024, 1, 15, 18, 0);
        let mut r = rehearsal(Some(RecurrenceSpec::Monthly {
            interval: 2,
            end: RecurrenceEnd::Count(3),
        }));
        r.start_time = start;
        r.end_time = start + Duration::hours(2);
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2030, 1, 1, 0, 0));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 15), date(2024, 3, 15), date(2024, 5, 15)]
        );
    }

    #[test]
    fn test_monthly_day_31_clamps_to_month_end() {
        let start = utc(2024, 1, 31, 18, 0);
        let mut r = rehearsal(Some(RecurrenceSpec::Monthly {
            interval: 1,
            end: RecurrenceEnd::Never,
        }));
        r.start_time = start;
        r.end_time = start + Duration::hours(2);
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 4, 30, 23, 59));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        // leap-year February clamps to the 29th, March returns to the 31st
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 31),
                date(2024, 4, 30),
            ]
        );
    }

    #[test]
    fn test_daily_interval() {
        let r = rehearsal(Some(RecurrenceSpec::Daily {
            interval: 3,
            end: RecurrenceEnd::Never,
        }));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 10, 23, 59));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 4), date(2024, 1, 7), date(2024, 1, 10)]
        );
    }

    #[test]
    fn test_weekly_interval_two_skips_off_weeks() {
        let r = rehearsal(Some(RecurrenceSpec::Weekly {
            interval: 2,
            weekdays: BTreeSet::from([1, 3]), // Monday, Wednesday
            end: RecurrenceEnd::Never,
        }));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 31, 23, 59));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 1),  // Mon, week 0
                date(2024, 1, 3),  // Wed, week 0
                date(2024, 1, 15), // Mon, week 2
                date(2024, 1, 17), // Wed, week 2
                date(2024, 1, 29), // Mon, week 4
                date(2024, 1, 31), // Wed, week 4
            ]
        );
    }

    #[test]
    fn test_until_is_inclusive_of_end_date() {
        let r = rehearsal(Some(RecurrenceSpec::Weekly {
            interval: 1,
            weekdays: BTreeSet::from([1]),
            end: RecurrenceEnd::Until(date(2024, 1, 15)),
        }));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 12, 31, 0, 0));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]
        );
    }

    #[test]
    fn test_override_replaces_only_its_occurrence() {
        let r = rehearsal(weekly_mondays());
        let moved = utc(2024, 1, 8, 20, 0);
        let overrides = BTreeMap::from([(
            date(2024, 1, 8),
            OccurrenceOverride {
                rehearsal_id: r.id,
                date: date(2024, 1, 8),
                start_time: Some(moved),
                end_time: None,
                location: Some("Basement".into()),
            },
        )]);
        let got = collect(&r, &overrides, utc(2024, 1, 1, 0, 0), utc(2024, 1, 22, 23, 59));
        assert_eq!(got.len(), 4);
        let patched = &got[1];
        assert!(patched.overridden);
        assert_eq!(patched.start_time, moved);
        // duration invariant holds when only the start is overridden
        assert_eq!(patched.end_time, moved + r.duration());
        assert_eq!(patched.location.as_deref(), Some("Basement"));
        for other in [&got[0], &got[2], &got[3]] {
            assert!(!other.overridden);
            assert_eq!(other.location.as_deref(), Some("Studio A"));
        }
    }

    #[test]
    fn test_exception_matches_canonical_date_despite_time_shift() {
        // Rule at UTC-5; instants land on the next UTC day but the
        // canonical calendar date is what a cancellation matches.
        let mut r = rehearsal(weekly_mondays());
        r.tz_offset_minutes = -300;
        r.start_time = utc(2024, 1, 2, 2, 0); // Mon 2024-01-01 21:00 at UTC-5
        r.end_time = r.start_time + Duration::hours(2);
        r.cancelled_dates.insert(date(2024, 1, 8));
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 1, 31, 0, 0));
        let dates: Vec<_> = got.iter().map(|o| o.date).collect();
        assert!(!dates.contains(&date(2024, 1, 8)));
        assert!(dates.contains(&date(2024, 1, 1)));
        assert!(dates.contains(&date(2024, 1, 15)));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let r = rehearsal(None);
        let none = BTreeMap::new();
        let err = expand(&r, &none, utc(2024, 2, 1, 0, 0), utc(2024, 1, 1, 0, 0));
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_rule_rejected_on_expand() {
        let r = rehearsal(Some(RecurrenceSpec::Weekly {
            interval: 1,
            weekdays: BTreeSet::new(),
            end: RecurrenceEnd::Never,
        }));
        let none = BTreeMap::new();
        let err = expand(&r, &none, utc(2024, 1, 1, 0, 0), utc(2024, 2, 1, 0, 0));
        assert!(matches!(err, Err(Error::InvalidRule(_))));
    }

    #[test]
    fn test_far_future_window_on_endless_rule_terminates() {
        let r = rehearsal(weekly_mondays());
        let none = BTreeMap::new();
        let got = collect(&r, &none, utc(2030, 1, 1, 0, 0), utc(2030, 1, 31, 23, 59));
        // every Monday of January 2030
        assert_eq!(got.len(), 4);
        for o in &got {
            assert_eq!(o.date.weekday().num_days_from_sunday(), 1);
        }
    }
}
