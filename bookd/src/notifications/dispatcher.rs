//! Notification fan-out: persist, then push.
//!
//! ```text
//! dispatch(notification)
//!   ├─ NotificationStore::insert()
//!   │    ├─ Ok  → registry.push()           // best effort, never fails the caller
//!   │    └─ Err → retry_tx.try_send() ──────────────┐
//!   │                                               │
//!   │              ┌────────────────────────────────┘
//!   │              ▼
//!   │         retry worker (spawned task):
//!   │              ├─ sleep(schedule[i])
//!   │              ├─ insert() again
//!   │              └─ on success → registry.push()
//!   └─ return
//! ```
//!
//! Nothing on this path returns an error to the booking caller; failures are logged
//! and counted.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{instrument, warn};

use super::registry::ConnectionRegistry;
use super::templates;
use crate::db::handlers::NotificationStore;
use crate::db::models::{
    bookings::{Booking, BookingStatus},
    notifications::Notification,
};
use crate::types::{UserId, abbrev_uuid};

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    registry: ConnectionRegistry,
    retry_tx: mpsc::Sender<Notification>,
    retention: chrono::Duration,
}

impl NotificationDispatcher {
    /// Build a dispatcher and the receiving end of its retry queue, which belongs to the
    /// retry worker.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        registry: ConnectionRegistry,
        retention: std::time::Duration,
        retry_queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (retry_tx, retry_rx) = mpsc::channel(retry_queue_capacity);
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::days(30));
        let dispatcher = Self {
            store,
            registry,
            retry_tx,
            retention,
        };
        (dispatcher, retry_rx)
    }

    /// Record and push the notification for one recipient of a status change.
    #[instrument(skip(self, booking), fields(booking_id = %abbrev_uuid(&booking.id), recipient_id = %abbrev_uuid(&recipient_id), status = %new_status))]
    pub async fn notify_status_change(
        &self,
        booking: &Booking,
        new_status: BookingStatus,
        recipient_id: UserId,
        sender_id: Option<UserId>,
    ) -> Option<Notification> {
        let notification = templates::status_change(booking, new_status, recipient_id, sender_id, self.retention);
        self.dispatch(notification).await
    }

    /// Tell the provider a booking was requested.
    #[instrument(skip(self, booking), fields(booking_id = %abbrev_uuid(&booking.id)))]
    pub async fn notify_booking_created(&self, booking: &Booking) -> Option<Notification> {
        let notification = templates::booking_created(booking, self.retention);
        self.dispatch(notification).await
    }

    /// Persist, then push. Returns the stored record, or `None` if persistence failed
    /// and the notification was handed to the retry queue (or dropped).
    pub async fn dispatch(&self, notification: Notification) -> Option<Notification> {
        match self.store.insert(&notification).await {
            Ok(stored) => {
                counter!("bookd_notifications_persisted_total").increment(1);
                deliver(&self.registry, &stored);
                Some(stored)
            }
            Err(e) => {
                warn!(
                    notification_id = %abbrev_uuid(&notification.id),
                    recipient_id = %abbrev_uuid(&notification.recipient_id),
                    error = %e,
                    "Failed to persist notification, queueing for retry"
                );
                self.enqueue_retry(notification);
                None
            }
        }
    }

    fn enqueue_retry(&self, notification: Notification) {
        match self.retry_tx.try_send(notification) {
            Ok(()) => {
                counter!("bookd_notification_retries_total", "outcome" => "queued").increment(1);
            }
            Err(TrySendError::Full(dropped)) => {
                counter!("bookd_notification_retries_total", "outcome" => "queue_full").increment(1);
                warn!(notification_id = %abbrev_uuid(&dropped.id), "Retry queue full, dropping notification");
            }
            Err(TrySendError::Closed(dropped)) => {
                counter!("bookd_notification_retries_total", "outcome" => "queue_closed").increment(1);
                warn!(notification_id = %abbrev_uuid(&dropped.id), "Retry worker stopped, dropping notification");
            }
        }
    }
}

/// Best-effort live delivery of a persisted notification.
pub(crate) fn deliver(registry: &ConnectionRegistry, notification: &Notification) {
    let outcome = registry.push(notification);
    if outcome.delivered > 0 {
        counter!("bookd_notifications_delivered_total", "outcome" => "delivered").increment(outcome.delivered as u64);
    }
    if outcome.dropped > 0 {
        counter!("bookd_notifications_delivered_total", "outcome" => "buffer_full").increment(outcome.dropped as u64);
        warn!(
            recipient_id = %abbrev_uuid(&notification.recipient_id),
            dropped = outcome.dropped,
            "Live connection buffer full, notification left for the next fetch"
        );
    }
    if outcome.delivered == 0 && outcome.dropped == 0 {
        counter!("bookd_notifications_delivered_total", "outcome" => "offline").increment(1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::errors::{DbError, Result as DbResult};
    use crate::db::handlers::InMemoryStore;
    use crate::db::models::bookings::BookingCreateDBRequest;
    use crate::db::models::notifications::NotificationFilter;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Notification store whose first `failures` inserts fail.
    pub(crate) struct FlakyNotificationStore {
        pub inner: InMemoryStore,
        pub failures: AtomicUsize,
        /// Write through before reporting the failure
        pub commit_on_failure: bool,
    }

    impl FlakyNotificationStore {
        pub fn new(inner: InMemoryStore, failures: usize) -> Self {
            Self {
                inner,
                failures: AtomicUsize::new(failures),
                commit_on_failure: false,
            }
        }

        pub fn committing(inner: InMemoryStore, failures: usize) -> Self {
            Self {
                commit_on_failure: true,
                ..Self::new(inner, failures)
            }
        }
    }

    #[async_trait]
    impl NotificationStore for FlakyNotificationStore {
        async fn insert(&self, notification: &Notification) -> DbResult<Notification> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                if self.commit_on_failure {
                    NotificationStore::insert(&self.inner, notification).await?;
                }
                return Err(DbError::Other(anyhow::anyhow!("connection reset")));
            }
            NotificationStore::insert(&self.inner, notification).await
        }
        async fn list_for_recipient(&self, recipient_id: UserId, filter: &NotificationFilter) -> DbResult<Vec<Notification>> {
            self.inner.list_for_recipient(recipient_id, filter).await
        }
        async fn mark_read(&self, id: Uuid, recipient_id: UserId) -> DbResult<Option<Notification>> {
            self.inner.mark_read(id, recipient_id).await
        }
        async fn mark_all_read(&self, recipient_id: UserId) -> DbResult<u64> {
            self.inner.mark_all_read(recipient_id).await
        }
        async fn unread_count(&self, recipient_id: UserId) -> DbResult<i64> {
            self.inner.unread_count(recipient_id).await
        }
        async fn delete(&self, id: Uuid, recipient_id: UserId) -> DbResult<bool> {
            NotificationStore::delete(&self.inner, id, recipient_id).await
        }
        async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
            self.inner.purge_expired(now).await
        }
    }

    fn booking() -> Booking {
        Booking::new_pending(
            Uuid::new_v4(),
            BookingCreateDBRequest {
                provider_id: Uuid::new_v4(),
                service_offering_id: None,
                service_name: "Gutter cleaning".to_string(),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 30).unwrap(),
                scheduled_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                description: "Front and back".to_string(),
                contact: "+44 7700 900002".to_string(),
                hourly_rate: None,
                estimated_duration_hours: None,
                total_amount: None,
            },
        )
    }

    const RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    #[tokio::test]
    async fn test_persists_then_pushes_to_connected_recipient() {
        let store = InMemoryStore::new();
        let registry = ConnectionRegistry::new(8);
        let (dispatcher, _retry_rx) = NotificationDispatcher::new(Arc::new(store.clone()), registry.clone(), RETENTION, 4);
        let booking = booking();

        let (_guard, mut live) = registry.register(booking.requester_id);
        let stored = dispatcher
            .notify_status_change(&booking, BookingStatus::Accepted, booking.requester_id, Some(booking.provider_id))
            .await
            .unwrap();

        assert_eq!(live.recv().await.unwrap(), stored);
        let listed = store
            .list_for_recipient(booking.requester_id, &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(listed, vec![stored]);
    }

    #[tokio::test]
    async fn test_offline_recipient_still_gets_durable_record() {
        let store = InMemoryStore::new();
        let (dispatcher, _retry_rx) = NotificationDispatcher::new(Arc::new(store.clone()), ConnectionRegistry::new(8), RETENTION, 4);
        let booking = booking();

        dispatcher.notify_booking_created(&booking).await.unwrap();
        assert_eq!(store.unread_count(booking.provider_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_queued_not_raised() {
        let store = Arc::new(FlakyNotificationStore::new(InMemoryStore::new(), 1));
        let (dispatcher, mut retry_rx) = NotificationDispatcher::new(store, ConnectionRegistry::new(8), RETENTION, 4);
        let booking = booking();

        let result = dispatcher
            .notify_status_change(&booking, BookingStatus::Declined, booking.requester_id, Some(booking.provider_id))
            .await;
        assert!(result.is_none());

        let queued = retry_rx.try_recv().unwrap();
        assert_eq!(queued.recipient_id, booking.requester_id);
        assert_eq!(queued.title, "Job Declined");
    }

    #[tokio::test]
    async fn test_full_retry_queue_drops_without_blocking() {
        let store = Arc::new(FlakyNotificationStore::new(InMemoryStore::new(), 10));
        let (dispatcher, mut retry_rx) = NotificationDispatcher::new(store, ConnectionRegistry::new(8), RETENTION, 1);
        let booking = booking();

        for _ in 0..3 {
            assert!(dispatcher.notify_booking_created(&booking).await.is_none());
        }

        assert!(retry_rx.try_recv().is_ok());
        assert!(retry_rx.try_recv().is_err());
    }
}
