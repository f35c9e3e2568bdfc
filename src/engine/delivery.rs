//! Delivery of notifications to participants.
//!
//! A participant has at most one live connection, represented by the sending
//! half of the channel its socket writer drains. Every notification lands in
//! the outbox: as `sent` when it went out immediately, as `pending` when the
//! participant was unreachable. Pending rows are replayed in creation order on
//! the next connect. Delivery is at-least-once; payloads are full snapshots so
//! a duplicate is harmless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::engine::locks::KeyedLocks;
use crate::models::message::{Outbound, OutboundEnvelope};
use crate::models::notification::DeliveryStatus;
use crate::store::Store;

pub type Outlet = mpsc::UnboundedSender<OutboundEnvelope>;

struct Connection {
    id: u64,
    outlet: Outlet,
}

pub struct Hub {
    store: Arc<dyn Store>,
    connections: DashMap<String, Connection>,
    // Held while notifying or replaying for a recipient, so replayed rows
    // cannot be overtaken by a fresh notification.
    recipients: KeyedLocks<String>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Hub {
            store,
            connections: DashMap::new(),
            recipients: KeyedLocks::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `outlet` as the user's live connection, replacing any older
    /// one, then flushes the user's pending notifications. Returns the
    /// connection id to pass to [`Hub::disconnect`].
    pub async fn connect(&self, user: &str, outlet: Outlet) -> anyhow::Result<u64> {
        let _guard = self.recipients.lock(&user.to_string()).await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(user.to_string(), Connection { id, outlet: outlet.clone() });
        info!("User {} connected ({})", user, id);

        if let Err(err) = self.replay(user, id, &outlet).await {
            self.connections.remove_if(user, |_, c| c.id == id);
            return Err(err);
        }
        Ok(id)
    }

    async fn replay(&self, user: &str, id: u64, outlet: &Outlet) -> anyhow::Result<()> {
        let pending = self.store.pending_notifications(user).await?;
        let mut delivered = Vec::with_capacity(pending.len());
        for notification in pending {
            let envelope = OutboundEnvelope { user_id: user.to_string(), body: notification.body };
            if outlet.send(envelope).is_err() {
                warn!("Connection {} of {} closed during replay", id, user);
                break;
            }
            delivered.push(notification.id);
        }
        if !delivered.is_empty() {
            debug!("Replayed {} pending notifications to {}", delivered.len(), user);
        }
        self.store.mark_sent(&delivered).await
    }

    /// Drops the user's connection unless a newer one has replaced it.
    pub fn disconnect(&self, user: &str, id: u64) {
        if self.connections.remove_if(user, |_, c| c.id == id).is_some() {
            info!("Connection with user {} closed", user);
        }
    }

    #[cfg(test)]
    pub fn is_online(&self, user: &str) -> bool {
        self.connections.contains_key(user)
    }

    fn send_live(&self, user: &str, body: Outbound) -> bool {
        match self.connections.get(user) {
            Some(connection) => connection
                .outlet
                .send(OutboundEnvelope { user_id: user.to_string(), body })
                .is_ok(),
            None => false,
        }
    }

    /// Delivers `body` now if `user` is connected, otherwise queues it.
    ///
    /// `Sent` means handed to the connection's writer. The socket drains its
    /// queue before closing, but anything still queued when the peer's
    /// transport breaks is lost; clients recover with a `state-request`.
    pub async fn notify(&self, user: &str, body: Outbound) -> anyhow::Result<()> {
        let _guard = self.recipients.lock(&user.to_string()).await;
        let status = if self.send_live(user, body.clone()) {
            DeliveryStatus::Sent
        } else {
            debug!("User {} is not connected, {} queued", user, body.kind());
            DeliveryStatus::Pending
        };

        let saved = self.store.save_notification(user, &body, status, Utc::now()).await;
        match (saved, status) {
            (Ok(_), _) => Ok(()),
            // Already delivered; the outbox row is only an audit record.
            (Err(err), DeliveryStatus::Sent) => {
                error!("Could not record delivered {} for {}: {:?}", body.kind(), user, err);
                Ok(())
            }
            (Err(err), DeliveryStatus::Pending) => Err(err),
        }
    }

    /// Live-only answer to a request; never queued.
    pub async fn reply(&self, user: &str, body: Outbound) -> bool {
        self.send_live(user, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::FleetAccepted;
    use crate::store::MemoryStore;

    fn accepted(game_id: u32) -> Outbound {
        Outbound::FleetAccepted(FleetAccepted { game_id })
    }

    fn hub() -> (Hub, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Hub::new(store.clone()), store)
    }

    #[tokio::test]
    async fn offline_notifications_replay_in_order_once() {
        let (hub, store) = hub();
        hub.notify("ann", accepted(1)).await.unwrap();
        hub.notify("ann", accepted(2)).await.unwrap();
        hub.notify("bob", accepted(9)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.connect("ann", tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().body, accepted(1));
        assert_eq!(rx.recv().await.unwrap().body, accepted(2));
        assert!(rx.try_recv().is_err());
        assert!(store.pending_notifications("ann").await.unwrap().is_empty());
        assert_eq!(store.pending_notifications("bob").await.unwrap().len(), 1);

        // A second connect has nothing left to replay.
        hub.disconnect("ann", id);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.connect("ann", tx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn online_notifications_go_out_and_are_recorded_sent() {
        let (hub, store) = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.connect("ann", tx).await.unwrap();

        hub.notify("ann", accepted(4)).await.unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.user_id, "ann");
        assert_eq!(envelope.body, accepted(4));

        let outbox = store.outbox("ann").await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn closed_outlet_counts_as_offline() {
        let (hub, store) = hub();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.connect("ann", tx).await.unwrap();
        drop(rx);

        hub.notify("ann", accepted(5)).await.unwrap();
        assert_eq!(store.pending_notifications("ann").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_replay_leaves_user_offline() {
        let store = Arc::new(crate::engine::testing::Flaky::default());
        let hub = Hub::new(store.clone());
        hub.notify("ann", accepted(3)).await.unwrap();

        store.fail("pending_notifications", 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(hub.connect("ann", tx).await.is_err());
        assert!(!hub.is_online("ann"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.connect("ann", tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().body, accepted(3));
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_newer_connection() {
        let (hub, _) = hub();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let old = hub.connect("ann", old_tx).await.unwrap();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        hub.connect("ann", new_tx).await.unwrap();

        hub.disconnect("ann", old);
        assert!(hub.is_online("ann"));
        assert!(hub.reply("ann", accepted(6)).await);
        assert_eq!(new_rx.recv().await.unwrap().body, accepted(6));
    }
}
