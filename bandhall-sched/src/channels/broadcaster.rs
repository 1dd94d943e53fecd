//! Event broadcaster for realtime client updates
//!
//! Purely a fan-out relay: callers persist first, publish second. The
//! broadcaster never touches storage and delivery is best-effort,
//! at-most-once per currently-subscribed connection, with no retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bandhall_common::events::ScheduleEvent;

use super::GroupChannelRegistry;

/// Outbound queue of one WebSocket connection
pub type OutboundSender = mpsc::UnboundedSender<ScheduleEvent>;

/// Fans schedule events out to the connections subscribed to a band.
///
/// Holds the connection→sender map; the registry decides who is
/// subscribed, this decides where their events go.
pub struct EventBroadcaster {
    registry: Arc<GroupChannelRegistry>,
    senders: Mutex<HashMap<Uuid, OutboundSender>>,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<GroupChannelRegistry>) -> Self {
        Self {
            registry,
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a connection's outbound queue. Called when the WebSocket
    /// is accepted, before any join can reference the connection.
    pub fn register_connection(&self, connection_id: Uuid, sender: OutboundSender) {
        self.senders.lock().unwrap().insert(connection_id, sender);
        info!(
            "connection {} registered, total connections: {}",
            connection_id,
            self.connection_count()
        );
    }

    /// Tear a connection down: outbound queue and every band
    /// membership. Called synchronously on disconnect notification.
    pub fn disconnect(&self, connection_id: Uuid) {
        self.senders.lock().unwrap().remove(&connection_id);
        self.registry.drop_connection(connection_id);
        info!("connection {} disconnected", connection_id);
    }

    /// Deliver an event to every connection subscribed to the band at
    /// call time.
    ///
    /// The subscriber set is a snapshot: a connection that joins
    /// mid-publish does not receive this event. A send failure on one
    /// connection never aborts fan-out to the rest. Publishing to a
    /// band with zero subscribers is a legal no-op. Returns the number
    /// of connections the event was queued to.
    pub fn publish(&self, band_id: Uuid, event: &ScheduleEvent) -> usize {
        let targets = self.registry.subscribers_of(band_id);
        if targets.is_empty() {
            debug!("no subscribers for band {}, event dropped", band_id);
            return 0;
        }

        let senders = self.senders.lock().unwrap();
        let mut delivered = 0;
        for connection_id in &targets {
            match senders.get(connection_id) {
                Some(sender) => {
                    if sender.send(event.clone()).is_err() {
                        // Receiver already gone; disconnect cleanup will
                        // remove the registry entry shortly
                        warn!(
                            "send to connection {} failed, skipping",
                            connection_id
                        );
                    } else {
                        delivered += 1;
                    }
                }
                None => {
                    warn!(
                        "connection {} subscribed but has no live sender",
                        connection_id
                    );
                }
            }
        }
        debug!(
            "published event to {}/{} subscribers of band {}",
            delivered,
            targets.len(),
            band_id
        );
        delivered
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }
}
