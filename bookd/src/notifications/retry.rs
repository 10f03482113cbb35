//! Background retry of notifications whose first persistence attempt failed.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dispatcher::deliver;
use super::registry::ConnectionRegistry;
use crate::db::errors::DbError;
use crate::db::handlers::NotificationStore;
use crate::db::models::notifications::Notification;
use crate::types::abbrev_uuid;

/// Drain the retry queue until shutdown. Each notification gets one attempt per entry
/// of `schedule`, waiting that long before the attempt.
pub async fn run_retry_worker(
    mut queue: mpsc::Receiver<Notification>,
    store: Arc<dyn NotificationStore>,
    registry: ConnectionRegistry,
    schedule: Vec<Duration>,
    shutdown: CancellationToken,
) {
    tracing::info!(attempts = schedule.len(), "Starting notification retry worker");

    loop {
        let notification = tokio::select! {
            next = queue.recv() => match next {
                Some(notification) => notification,
                None => {
                    tracing::info!("Notification retry queue closed");
                    return;
                }
            },
            _ = shutdown.cancelled() => {
                tracing::info!(pending = queue.len(), "Notification retry worker shutting down");
                return;
            }
        };

        if !retry_one(&notification, store.as_ref(), &registry, &schedule, &shutdown).await && shutdown.is_cancelled() {
            return;
        }
    }
}

/// Returns whether the notification was persisted.
async fn retry_one(
    notification: &Notification,
    store: &dyn NotificationStore,
    registry: &ConnectionRegistry,
    schedule: &[Duration],
    shutdown: &CancellationToken,
) -> bool {
    let notification_id = abbrev_uuid(&notification.id);

    for (attempt, delay) in schedule.iter().enumerate() {
        tokio::select! {
            _ = tokio::time::sleep(*delay) => {}
            _ = shutdown.cancelled() => {
                tracing::warn!(notification_id = %notification_id, "Shutdown during notification retry, dropping");
                return false;
            }
        }

        match store.insert(notification).await {
            Ok(stored) => {
                counter!("bookd_notification_retries_total", "outcome" => "persisted").increment(1);
                counter!("bookd_notifications_persisted_total").increment(1);
                tracing::info!(notification_id = %notification_id, attempt = attempt + 1, "Notification persisted on retry");
                deliver(registry, &stored);
                return true;
            }
            // An earlier attempt committed but reported failure.
            Err(DbError::UniqueViolation { .. }) => {
                counter!("bookd_notification_retries_total", "outcome" => "persisted").increment(1);
                counter!("bookd_notifications_persisted_total").increment(1);
                tracing::info!(notification_id = %notification_id, attempt = attempt + 1, "Notification was already persisted");
                deliver(registry, notification);
                return true;
            }
            Err(e) => {
                tracing::warn!(notification_id = %notification_id, attempt = attempt + 1, error = %e, "Notification retry failed");
            }
        }
    }

    counter!("bookd_notification_retries_total", "outcome" => "exhausted").increment(1);
    tracing::error!(
        notification_id = %notification_id,
        recipient_id = %abbrev_uuid(&notification.recipient_id),
        attempts = schedule.len(),
        "Giving up on notification after all retries"
    );
    false
}
