//! Periodic purge of expired notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio_util::sync::CancellationToken;

use crate::db::handlers::NotificationStore;

pub async fn run_expiry_sweeper(store: Arc<dyn NotificationStore>, interval: Duration, shutdown: CancellationToken) {
    tracing::info!(sweep_interval = ?interval, "Starting notification expiry sweeper");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Notification expiry sweeper shutting down");
                return;
            }
        }

        match store.purge_expired(Utc::now()).await {
            Ok(0) => tracing::debug!("No expired notifications"),
            Ok(purged) => {
                counter!("bookd_notifications_purged_total").increment(purged);
                tracing::info!(purged, "Purged expired notifications");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired notifications"),
        }
    }
}
