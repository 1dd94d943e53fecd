//! bandhall-sched library - rehearsal scheduling service
//!
//! Expands recurrence rules into calendar occurrences on the read path
//! and fans schedule/attendance mutations out to the WebSocket
//! subscribers of the affected band.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bandhall_common::db::ScheduleStore;

use crate::channels::{EventBroadcaster, GroupChannelRegistry};

pub mod api;
pub mod channels;
pub mod ops;

/// Application state shared across HTTP handlers
///
/// Registry and broadcaster are created here and live for the process;
/// nothing channel-related hides in statics, so all of it can be
/// instantiated directly in tests without a running transport.
#[derive(Clone)]
pub struct AppState {
    /// Persistence boundary (SQLite in production)
    pub store: Arc<dyn ScheduleStore>,
    /// Which live connections are interested in which band
    pub registry: Arc<GroupChannelRegistry>,
    /// Fan-out relay over the registry
    pub broadcaster: Arc<EventBroadcaster>,
}

impl AppState {
    /// Create application state around a store
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        let registry = Arc::new(GroupChannelRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(registry.clone()));
        Self {
            store,
            registry,
            broadcaster,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health_check))
        // Realtime channel
        .route("/ws", get(api::ws::ws_upgrade))
        // Calendar reads
        .route(
            "/api/bands/:band_id/rehearsals",
            get(api::rehearsals::get_band_occurrences),
        )
        .route(
            "/api/rehearsals/:id/occurrences",
            get(api::rehearsals::get_occurrences),
        )
        // Schedule mutations
        .route("/api/rehearsals", post(api::rehearsals::create_rehearsal))
        .route(
            "/api/rehearsals/:id",
            put(api::rehearsals::update_rehearsal).delete(api::rehearsals::delete_rehearsal),
        )
        .route(
            "/api/rehearsals/:id/cancellations",
            post(api::rehearsals::add_cancellation),
        )
        .route(
            "/api/rehearsals/:id/cancellations/:date",
            axum::routing::delete(api::rehearsals::remove_cancellation),
        )
        .route(
            "/api/rehearsals/:id/occurrences/:date",
            put(api::rehearsals::put_override),
        )
        // Attendance
        .route(
            "/api/rehearsals/:id/occurrences/:date/attendance",
            put(api::attendance::put_attendance),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
