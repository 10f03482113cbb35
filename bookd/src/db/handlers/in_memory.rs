//! In-memory storage implementation.
//!
//! Bookings and notifications live behind `parking_lot` read/write locks, actors in a
//! `DashMap`. Every conditional write happens while holding the relevant lock or map
//! entry guard, so compare-and-set semantics match the Postgres backend. Data is lost
//! on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

use super::{ActorDirectory, BookingStore, NotificationStore, QuotaStore, ReserveOutcome, VerificationGate};
use crate::db::errors::{DbError, Result};
use crate::db::models::{
    actors::{Actor, ProviderQuota, SubscriptionTier},
    bookings::{Booking, StatusUpdate},
    notifications::{Notification, NotificationFilter},
};
use crate::types::{BookingId, NotificationId, UserId};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    actors: Arc<DashMap<UserId, Actor>>,
    approved: Arc<DashSet<UserId>>,
    notifications: Arc<RwLock<HashMap<NotificationId, Notification>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.read().get(&id).cloned())
    }

    async fn insert(&self, booking: &Booking) -> Result<Booking> {
        let mut bookings = self.bookings.write();
        if bookings.contains_key(&booking.id) {
            return Err(DbError::UniqueViolation {
                constraint: Some("bookings_pkey".to_string()),
                table: Some("bookings".to_string()),
                message: format!("booking {} already exists", booking.id),
            });
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn update_status(&self, id: BookingId, update: StatusUpdate) -> Result<Option<Booking>> {
        let mut bookings = self.bookings.write();
        let Some(booking) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.status != update.expected {
            return Ok(None);
        }

        let now = Utc::now();
        booking.status = update.new_status;
        booking.updated_at = now;
        if let Some(field) = update.timestamp {
            booking.stamp(field, now);
        }
        Ok(Some(booking.clone()))
    }

    async fn delete(&self, id: BookingId) -> Result<bool> {
        Ok(self.bookings.write().remove(&id).is_some())
    }

    async fn list_for_actor(&self, actor_id: Option<UserId>) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| actor_id.is_none_or(|id| b.is_party(id)))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}

#[async_trait]
impl ActorDirectory for InMemoryStore {
    async fn get_actor(&self, id: UserId) -> Result<Option<Actor>> {
        Ok(self.actors.get(&id).map(|actor| actor.clone()))
    }

    async fn upsert_actor(&self, actor: &Actor) -> Result<()> {
        if actor.quota.is_some() && !actor.is_provider() {
            return Err(DbError::Other(anyhow::anyhow!(
                "actors_tier_only_for_providers: {} actor {} cannot hold a subscription",
                actor.role.as_str(),
                actor.id
            )));
        }
        self.actors.insert(actor.id, actor.clone());
        Ok(())
    }
}

#[async_trait]
impl VerificationGate for InMemoryStore {
    async fn is_approved(&self, user_id: UserId) -> Result<bool> {
        Ok(self.approved.contains(&user_id))
    }

    async fn set_approved(&self, user_id: UserId, approved: bool) -> Result<()> {
        if approved {
            self.approved.insert(user_id);
        } else {
            self.approved.remove(&user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for InMemoryStore {
    async fn reserve(&self, provider_id: UserId) -> Result<ReserveOutcome> {
        // The entry guard is the atomic section: check and increment happen under it.
        let Some(mut actor) = self.actors.get_mut(&provider_id) else {
            return Ok(ReserveOutcome::UnknownProvider);
        };
        if !actor.is_provider() {
            return Ok(ReserveOutcome::UnknownProvider);
        }
        let Some(quota) = actor.quota.as_mut() else {
            return Ok(ReserveOutcome::UnknownProvider);
        };

        if quota.has_capacity() {
            quota.accepted_jobs += 1;
            Ok(ReserveOutcome::Reserved(*quota))
        } else {
            Ok(ReserveOutcome::Exhausted(*quota))
        }
    }

    async fn release(&self, provider_id: UserId) -> Result<Option<ProviderQuota>> {
        let Some(mut actor) = self.actors.get_mut(&provider_id) else {
            return Ok(None);
        };
        Ok(actor.quota.as_mut().map(|quota| {
            quota.accepted_jobs = (quota.accepted_jobs - 1).max(0);
            *quota
        }))
    }

    async fn reset_for_tier(&self, provider_id: UserId, tier: SubscriptionTier, max_jobs: i32) -> Result<Option<ProviderQuota>> {
        let Some(mut actor) = self.actors.get_mut(&provider_id) else {
            return Ok(None);
        };
        if !actor.is_provider() {
            return Ok(None);
        }
        let quota = ProviderQuota {
            subscription_tier: tier,
            accepted_jobs: 0,
            max_jobs,
        };
        actor.quota = Some(quota);
        Ok(Some(quota))
    }

    async fn quota(&self, provider_id: UserId) -> Result<Option<ProviderQuota>> {
        Ok(self.actors.get(&provider_id).and_then(|actor| actor.quota))
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<Notification> {
        let mut notifications = self.notifications.write();
        if notifications.contains_key(&notification.id) {
            return Err(DbError::UniqueViolation {
                constraint: Some("notifications_pkey".to_string()),
                table: Some("notifications".to_string()),
                message: format!("notification {} already exists", notification.id),
            });
        }
        notifications.insert(notification.id, notification.clone());
        Ok(notification.clone())
    }

    async fn list_for_recipient(&self, recipient_id: UserId, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let now = Utc::now();
        let mut found: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.is_expired(now))
            .filter(|n| !filter.unread_only || !n.read)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            found.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(found)
    }

    async fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> Result<Option<Notification>> {
        let mut notifications = self.notifications.write();
        match notifications.get_mut(&id) {
            Some(notification) if notification.recipient_id == recipient_id => {
                notification.read = true;
                Ok(Some(notification.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> Result<u64> {
        let now = Utc::now();
        let mut updated = 0;
        for notification in self.notifications.write().values_mut() {
            if notification.recipient_id == recipient_id && !notification.read && !notification.is_expired(now) {
                notification.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn unread_count(&self, recipient_id: UserId) -> Result<i64> {
        let now = Utc::now();
        let count = self
            .notifications
            .read()
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.read && !n.is_expired(now))
            .count();
        Ok(count as i64)
    }

    async fn delete(&self, id: NotificationId, recipient_id: UserId) -> Result<bool> {
        let mut notifications = self.notifications.write();
        if notifications.get(&id).is_some_and(|n| n.recipient_id == recipient_id) {
            notifications.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut notifications = self.notifications.write();
        let before = notifications.len();
        notifications.retain(|_, n| !n.is_expired(now));
        Ok((before - notifications.len()) as u64)
    }
}
