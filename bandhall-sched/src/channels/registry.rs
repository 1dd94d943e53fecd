//! Connection↔band membership registry
//!
//! Process-lifetime state only: rebuilt from explicit join messages as
//! clients reconnect, cleared entry-by-entry on disconnect. Every
//! operation is idempotent and operations on untracked ids are no-ops,
//! because disconnect races are expected and must not crash the relay.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    by_band: HashMap<Uuid, HashSet<Uuid>>,
    by_connection: HashMap<Uuid, HashSet<Uuid>>,
}

/// Tracks which live connections are subscribed to which band's events.
///
/// Guard scopes are short and never cross an await, so handlers on the
/// multi-threaded runtime see each operation as atomic.
#[derive(Default)]
pub struct GroupChannelRegistry {
    inner: Mutex<Inner>,
}

impl GroupChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a band. Joining twice is a no-op.
    pub fn join(&self, connection_id: Uuid, band_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_band.entry(band_id).or_default().insert(connection_id);
        inner
            .by_connection
            .entry(connection_id)
            .or_default()
            .insert(band_id);
        debug!("connection {} joined band {}", connection_id, band_id);
    }

    /// Unsubscribe a connection from a band. Leaving a band that was
    /// never joined is a no-op.
    pub fn leave(&self, connection_id: Uuid, band_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(members) = inner.by_band.get_mut(&band_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.by_band.remove(&band_id);
            }
        }
        if let Some(bands) = inner.by_connection.get_mut(&connection_id) {
            bands.remove(&band_id);
            if bands.is_empty() {
                inner.by_connection.remove(&connection_id);
            }
        }
        debug!("connection {} left band {}", connection_id, band_id);
    }

    /// Snapshot of the connections currently subscribed to a band
    pub fn subscribers_of(&self, band_id: Uuid) -> HashSet<Uuid> {
        self.inner
            .lock()
            .unwrap()
            .by_band
            .get(&band_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a connection from every band it joined
    pub fn drop_connection(&self, connection_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(bands) = inner.by_connection.remove(&connection_id) {
            for band_id in bands {
                if let Some(members) = inner.by_band.get_mut(&band_id) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        inner.by_band.remove(&band_id);
                    }
                }
            }
            debug!("connection {} dropped from registry", connection_id);
        }
    }

    /// Number of live connections with at least one subscription
    pub fn connection_count(&self) -> usize {
        self.inner.lock().unwrap().by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_subscribers() {
        let registry = GroupChannelRegistry::new();
        let conn = Uuid::new_v4();
        let band = Uuid::new_v4();

        registry.join(conn, band);
        assert_eq!(registry.subscribers_of(band), HashSet::from([conn]));
    }

    #[test]
    fn test_double_join_is_single_membership() {
        let registry = GroupChannelRegistry::new();
        let conn = Uuid::new_v4();
        let band = Uuid::new_v4();

        registry.join(conn, band);
        registry.join(conn, band);
        assert_eq!(registry.subscribers_of(band).len(), 1);
    }

    #[test]
    fn test_leave_unjoined_band_is_noop() {
        let registry = GroupChannelRegistry::new();
        registry.leave(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_leave_removes_membership() {
        let registry = GroupChannelRegistry::new();
        let conn = Uuid::new_v4();
        let band = Uuid::new_v4();

        registry.join(conn, band);
        registry.leave(conn, band);
        assert!(registry.subscribers_of(band).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_subscribers_are_per_band() {
        let registry = GroupChannelRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (band_x, band_y) = (Uuid::new_v4(), Uuid::new_v4());

        registry.join(a, band_x);
        registry.join(b, band_y);
        assert_eq!(registry.subscribers_of(band_x), HashSet::from([a]));
        assert_eq!(registry.subscribers_of(band_y), HashSet::from([b]));
    }

    #[test]
    fn test_drop_connection_clears_all_memberships() {
        let registry = GroupChannelRegistry::new();
        let conn = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (band_x, band_y) = (Uuid::new_v4(), Uuid::new_v4());

        registry.join(conn, band_x);
        registry.join(conn, band_y);
        registry.join(other, band_x);
        registry.drop_connection(conn);

        assert_eq!(registry.subscribers_of(band_x), HashSet::from([other]));
        assert!(registry.subscribers_of(band_y).is_empty());
    }

    #[test]
    fn test_drop_unknown_connection_is_noop() {
        let registry = GroupChannelRegistry::new();
        registry.drop_connection(Uuid::new_v4());
        assert_eq!(registry.connection_count(), 0);
    }
}
