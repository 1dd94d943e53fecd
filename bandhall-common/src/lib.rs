//! # Bandhall Common Library
//!
//! Shared code for the bandhall rehearsal scheduling service:
//! - Database schema, row models and the `ScheduleStore` trait
//! - Event types (ScheduleEvent enum) for the realtime channel
//! - Recurrence rule model and occurrence expansion
//! - Attendance model and per-occurrence summaries
//! - Configuration loading
//! - Utility functions

pub mod attendance;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod recurrence;
pub mod time;

pub use error::{Error, Result};
