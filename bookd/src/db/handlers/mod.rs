//! Storage contracts and their implementations.
//!
//! Each trait covers one persistence concern the core consumes:
//!
//! - [`BookingStore`]: booking records, with a status update conditioned on the
//!   expected current status (the per-booking serialization point)
//! - [`ActorDirectory`]: role and subscription lookup for actors
//! - [`VerificationGate`]: the boolean KYC approval state of an actor
//! - [`QuotaStore`]: the per-provider accepted-jobs counter, updated with a single
//!   atomic conditional write (the per-provider serialization point)
//! - [`NotificationStore`]: durable notification records and the recipient read surface
//!
//! Two backends implement all of them: [`InMemoryStore`] (tests, single-process
//! deployments) and [`PostgresStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::errors::Result;
use crate::db::models::{
    actors::{Actor, ProviderQuota, SubscriptionTier},
    bookings::{Booking, StatusUpdate},
    notifications::{Notification, NotificationFilter},
};
use crate::types::{BookingId, NotificationId, UserId};

pub mod in_memory;
pub mod postgres;


pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Get a booking by ID
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Insert a new booking. Fails with `UniqueViolation` if the ID is taken.
    async fn insert(&self, booking: &Booking) -> Result<Booking>;

    /// Move a booking to `update.new_status` if and only if its stored status is
    /// still `update.expected`, stamping `update.timestamp` if it is unset.
    ///
    /// Returns `None` when the booking does not exist or its status no longer
    /// matches; the caller decides which of the two it was.
    async fn update_status(&self, id: BookingId, update: StatusUpdate) -> Result<Option<Booking>>;

    /// Hard-delete a booking. Returns whether a row was removed.
    async fn delete(&self, id: BookingId) -> Result<bool>;

    /// Bookings where the actor is requester or provider, newest first.
    /// `None` lists every booking.
    async fn list_for_actor(&self, actor_id: Option<UserId>) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn get_actor(&self, id: UserId) -> Result<Option<Actor>>;

    /// Create or replace an actor record (including its quota).
    async fn upsert_actor(&self, actor: &Actor) -> Result<()>;
}

#[async_trait]
pub trait VerificationGate: Send + Sync {
    async fn is_approved(&self, user_id: UserId) -> Result<bool>;

    async fn set_approved(&self, user_id: UserId, approved: bool) -> Result<()>;
}

/// Outcome of an attempted quota reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The counter was incremented; carries the quota after the increment.
    Reserved(ProviderQuota),
    /// The provider is at its ceiling; nothing changed.
    Exhausted(ProviderQuota),
    /// No provider with a quota exists under this ID.
    UnknownProvider,
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Increment `accepted_jobs` only if it is below `max_jobs`, as one atomic step.
    async fn reserve(&self, provider_id: UserId) -> Result<ReserveOutcome>;

    /// Undo one reservation. Never takes the counter below zero.
    async fn release(&self, provider_id: UserId) -> Result<Option<ProviderQuota>>;

    /// Start a new subscription period: set the tier and ceiling, zero the counter.
    async fn reset_for_tier(&self, provider_id: UserId, tier: SubscriptionTier, max_jobs: i32) -> Result<Option<ProviderQuota>>;

    async fn quota(&self, provider_id: UserId) -> Result<Option<ProviderQuota>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<Notification>;

    /// Unexpired notifications of a recipient, newest first.
    async fn list_for_recipient(&self, recipient_id: UserId, filter: &NotificationFilter) -> Result<Vec<Notification>>;

    /// Mark one of the recipient's notifications read. `None` if it is not theirs or does not exist.
    async fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> Result<Option<Notification>>;

    async fn mark_all_read(&self, recipient_id: UserId) -> Result<u64>;

    async fn unread_count(&self, recipient_id: UserId) -> Result<i64>;

    async fn delete(&self, id: NotificationId, recipient_id: UserId) -> Result<bool>;

    /// Remove every notification whose `expires_at` is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
