//! Recurrence specification: closed variants plus the JSON wire shape
//!
//! The stored/wire form is an open JSON object with frequency-dependent
//! fields. Internally each frequency is its own variant carrying only
//! the fields that frequency requires, so invalid combinations (weekday
//! list on a monthly rule, two termination conditions at once) cannot be
//! constructed at all — deserialization is the validation boundary.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Wire weekday numbering: 0 = Sunday .. 6 = Saturday
pub const WEEKDAY_MAX: u8 = 6;

/// How a recurring series terminates. Exactly one condition applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceEnd {
    /// Runs forever (bounded only by the query window)
    Never,
    /// Last admissible occurrence date, inclusive, in the rule's
    /// canonical offset
    Until(NaiveDate),
    /// Exactly this many non-cancelled occurrences
    Count(u32),
}

/// A validated recurrence specification.
///
/// `interval` is "every N units" and is always ≥ 1. Weekly rules carry a
/// non-empty weekday set (wire numbering, 0 = Sunday).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceSpec {
    Daily {
        interval: u32,
        end: RecurrenceEnd,
    },
    Weekly {
        interval: u32,
        weekdays: BTreeSet<u8>,
        end: RecurrenceEnd,
    },
    Monthly {
        interval: u32,
        end: RecurrenceEnd,
    },
}

impl RecurrenceSpec {
    pub fn interval(&self) -> u32 {
        match self {
            RecurrenceSpec::Daily { interval, .. }
            | RecurrenceSpec::Weekly { interval, .. }
            | RecurrenceSpec::Monthly { interval, .. } => *interval,
        }
    }

    pub fn end(&self) -> RecurrenceEnd {
        match self {
            RecurrenceSpec::Daily { end, .. }
            | RecurrenceSpec::Weekly { end, .. }
            | RecurrenceSpec::Monthly { end, .. } => *end,
        }
    }

    /// Re-check the construction invariants.
    ///
    /// Deserialization already enforces these; this exists for rules
    /// built directly in code.
    pub fn validate(&self) -> Result<()> {
        if self.interval() == 0 {
            return Err(Error::InvalidRule("interval must be at least 1".into()));
        }
        if let RecurrenceEnd::Count(0) = self.end() {
            return Err(Error::InvalidRule("count must be at least 1".into()));
        }
        if let RecurrenceSpec::Weekly { weekdays, .. } = self {
            if weekdays.is_empty() {
                return Err(Error::InvalidRule(
                    "weekly rule requires a non-empty weekday set".into(),
                ));
            }
            if let Some(bad) = weekdays.iter().find(|d| **d > WEEKDAY_MAX) {
                return Err(Error::InvalidRule(format!(
                    "weekday {} out of range 0..=6",
                    bad
                )));
            }
        }
        Ok(())
    }
}

/// Stored/wire shape of a recurrence rule
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecurrenceWire {
    frequency: String,
    interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    weekdays: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
}

impl TryFrom<RecurrenceWire> for RecurrenceSpec {
    type Error = Error;

    fn try_from(wire: RecurrenceWire) -> Result<Self> {
        if wire.interval == 0 {
            return Err(Error::InvalidRule("interval must be at least 1".into()));
        }

        let end = match (wire.end_date, wire.count) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRule(
                    "endDate and count are mutually exclusive".into(),
                ))
            }
            (Some(date), None) => RecurrenceEnd::Until(date),
            (None, Some(0)) => {
                return Err(Error::InvalidRule("count must be at least 1".into()))
            }
            (None, Some(count)) => RecurrenceEnd::Count(count),
            (None, None) => RecurrenceEnd::Never,
        };

        let spec = match wire.frequency.as_str() {
            "daily" | "monthly" => {
                if wire.weekdays.is_some() {
                    return Err(Error::InvalidRule(format!(
                        "weekdays are only valid on weekly rules, not {}",
                        wire.frequency
                    )));
                }
                if wire.frequency == "daily" {
                    RecurrenceSpec::Daily {
                        interval: wire.interval,
                        end,
                    }
                } else {
                    RecurrenceSpec::Monthly {
                        interval: wire.interval,
                        end,
                    }
                }
            }
            "weekly" => {
                let weekdays: BTreeSet<u8> = wire
                    .weekdays
                    .ok_or_else(|| {
                        Error::InvalidRule("weekly rule requires a weekday set".into())
                    })?
                    .into_iter()
                    .collect();
                RecurrenceSpec::Weekly {
                    interval: wire.interval,
                    weekdays,
                    end,
                }
            }
            other => {
                return Err(Error::InvalidRule(format!(
                    "unknown frequency '{}'",
                    other
                )))
            }
        };

        spec.validate()?;
        Ok(spec)
    }
}

impl From<&RecurrenceSpec> for RecurrenceWire {
    fn from(spec: &RecurrenceSpec) -> Self {
        let (end_date, count) = match spec.end() {
            RecurrenceEnd::Never => (None, None),
            RecurrenceEnd::Until(date) => (Some(date), None),
            RecurrenceEnd::Count(count) => (None, Some(count)),
        };
        match spec {
            RecurrenceSpec::Daily { interval, .. } => RecurrenceWire {
                frequency: "daily".into(),
                interval: *interval,
                weekdays: None,
                end_date,
                count,
            },
            RecurrenceSpec::Weekly {
                interval, weekdays, ..
            } => RecurrenceWire {
                frequency: "weekly".into(),
                interval: *interval,
                weekdays: Some(weekdays.iter().copied().collect()),
                end_date,
                count,
            },
            RecurrenceSpec::Monthly { interval, .. } => RecurrenceWire {
                frequency: "monthly".into(),
                interval: *interval,
                weekdays: None,
                end_date,
                count,
            },
        }
    }
}

impl Serialize for RecurrenceSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RecurrenceWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecurrenceSpec {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let wire = RecurrenceWire::deserialize(deserializer)?;
        RecurrenceSpec::try_from(wire).map_err(serde::de::Error::custom)
    }
}
