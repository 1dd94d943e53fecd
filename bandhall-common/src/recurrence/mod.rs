//! Recurrence rule model and occurrence expansion
//!
//! A rehearsal series is a compact rule (frequency, interval, optional
//! termination) plus a sparse set of exception dates and per-date
//! overrides. `expand` turns that into the concrete occurrences of a
//! bounded window without ever materializing the unbounded series.

mod expand;
mod spec;

pub use expand::{expand, ExpandIter, Occurrence};
pub use spec::{RecurrenceEnd, RecurrenceSpec};
