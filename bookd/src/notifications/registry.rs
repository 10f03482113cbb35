//! Live connections of recipients, keyed by user.
//!
//! A recipient may hold any number of connections (tabs, devices). Each one is a
//! bounded `mpsc` channel; the receiving half backs a real-time stream. Registration
//! hands back a [`ConnectionGuard`] that unregisters on drop, so a closed stream
//! always leaves the registry.
//!
//! Pushes never block: a full channel drops the message for that connection only, and
//! a closed channel is pruned. The registry is an optimisation; durable records are the
//! source of truth.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::db::models::notifications::Notification;
use crate::types::{ConnectionId, UserId, abbrev_uuid};

struct ConnectionEntry {
    id: ConnectionId,
    sender: mpsc::Sender<Notification>,
}

struct RegistryInner {
    connections: DashMap<UserId, Vec<ConnectionEntry>>,
    channel_capacity: usize,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

/// Result of pushing one notification to every connection of a recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub delivered: usize,
    /// Connections whose buffer was full
    pub dropped: usize,
}

/// Removes its connection from the registry when dropped.
pub struct ConnectionGuard {
    registry: ConnectionRegistry,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl ConnectionGuard {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.user_id, self.connection_id);
    }
}

impl ConnectionRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                channel_capacity,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Add a connection for `user_id`. After [`close_all`](Self::close_all) the returned
    /// receiver is already closed.
    pub fn register(&self, user_id: UserId) -> (ConnectionGuard, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);
        let connection_id = Uuid::new_v4();

        if !self.inner.closed.load(Ordering::Acquire) {
            self.inner.connections.entry(user_id).or_default().push(ConnectionEntry {
                id: connection_id,
                sender,
            });
            debug!(user_id = %abbrev_uuid(&user_id), connection_id = %abbrev_uuid(&connection_id), "Connection registered");
        }

        let guard = ConnectionGuard {
            registry: self.clone(),
            user_id,
            connection_id,
        };
        (guard, receiver)
    }

    fn unregister(&self, user_id: UserId, connection_id: ConnectionId) {
        if let Some(mut entries) = self.inner.connections.get_mut(&user_id) {
            entries.retain(|entry| entry.id != connection_id);
        }
        self.inner.connections.remove_if(&user_id, |_, entries| entries.is_empty());
        debug!(user_id = %abbrev_uuid(&user_id), connection_id = %abbrev_uuid(&connection_id), "Connection unregistered");
    }

    /// Offer `notification` to every live connection of its recipient.
    pub fn push(&self, notification: &Notification) -> PushOutcome {
        let user_id = notification.recipient_id;
        let mut outcome = PushOutcome::default();

        if let Some(mut entries) = self.inner.connections.get_mut(&user_id) {
            entries.retain(|entry| match entry.sender.try_send(notification.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        self.inner.connections.remove_if(&user_id, |_, entries| entries.is_empty());

        outcome
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.inner.connections.get(&user_id).map_or(0, |entries| entries.len())
    }

    pub fn total_connections(&self) -> usize {
        self.inner.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Drop every sender so open streams end, and refuse new registrations.
    pub fn close_all(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::notifications::{NotificationCategory, NotificationType};
    use chrono::Utc;

    fn notification_for(recipient_id: UserId) -> Notification {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4(),
            recipient_id,
            sender_id: None,
            title: "Job Started".to_string(),
            message: "started".to_string(),
            notification_type: NotificationType::Info,
            category: NotificationCategory::JobStatus,
            important: false,
            payload: serde_json::Value::Null,
            read: false,
            created_at: now,
            expires_at: now + chrono::Duration::days(30),
        }
    }

    #[tokio::test]
    async fn test_push_reaches_every_connection_of_recipient() {
        let registry = ConnectionRegistry::new(8);
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (_g1, mut rx1) = registry.register(user);
        let (_g2, mut rx2) = registry.register(user);
        let (_g3, mut rx3) = registry.register(other);

        let n = notification_for(user);
        assert_eq!(registry.push(&n), PushOutcome { delivered: 2, dropped: 0 });

        assert_eq!(rx1.recv().await.unwrap().id, n.id);
        assert_eq!(rx2.recv().await.unwrap().id, n.id);
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_guard_drop_unregisters() {
        let registry = ConnectionRegistry::new(8);
        let user = Uuid::new_v4();

        let (guard, _rx) = registry.register(user);
        let (_keep, _rx2) = registry.register(user);
        assert_eq!(registry.connection_count(user), 2);

        drop(guard);
        assert_eq!(registry.connection_count(user), 1);
        assert_eq!(registry.total_connections(), 1);
    }

    #[tokio::test]
    async fn test_closed_receivers_are_pruned_and_full_buffers_drop() {
        let registry = ConnectionRegistry::new(1);
        let user = Uuid::new_v4();

        let (_g1, rx1) = registry.register(user);
        let (_g2, _rx2) = registry.register(user);
        drop(rx1);

        assert_eq!(registry.push(&notification_for(user)), PushOutcome { delivered: 1, dropped: 0 });
        assert_eq!(registry.connection_count(user), 1);

        // Buffer of one is now full.
        assert_eq!(registry.push(&notification_for(user)), PushOutcome { delivered: 0, dropped: 1 });
    }

    #[tokio::test]
    async fn test_push_to_offline_recipient_is_a_noop() {
        let registry = ConnectionRegistry::new(8);
        assert_eq!(registry.push(&notification_for(Uuid::new_v4())), PushOutcome::default());
    }

    #[tokio::test]
    async fn test_close_all_ends_streams() {
        let registry = ConnectionRegistry::new(8);
        let user = Uuid::new_v4();
        let (_guard, mut rx) = registry.register(user);

        registry.close_all();
        assert!(rx.recv().await.is_none());

        let (_late, mut late_rx) = registry.register(user);
        assert!(late_rx.recv().await.is_none());
        assert_eq!(registry.total_connections(), 0);
    }
}
