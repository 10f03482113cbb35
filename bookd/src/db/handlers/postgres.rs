//! PostgreSQL storage implementation.
//!
//! - Booking status changes are a single `UPDATE ... WHERE status = $expected`, so a
//!   stale writer affects zero rows instead of overwriting.
//! - Quota reservation is a single `UPDATE ... WHERE accepted_jobs < max_jobs`; the row
//!   lock taken by the update serializes concurrent reservations for one provider.
//! - Queries are runtime-checked (`sqlx::query_as` + `FromRow` rows) and mapped onto
//!   domain models with `TryFrom`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use super::{ActorDirectory, BookingStore, NotificationStore, QuotaStore, ReserveOutcome, VerificationGate};
use crate::db::errors::{DbError, Result};
use crate::db::models::{
    actors::{Actor, ProviderQuota, Role, SubscriptionTier},
    bookings::{Booking, BookingStatus, StatusUpdate},
    notifications::{Notification, NotificationCategory, NotificationFilter, NotificationType},
};
use crate::types::{BookingId, NotificationId, UserId, abbrev_uuid};

/// PostgreSQL storage backend over a shared connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: String) -> Result<T> {
    value.parse().map_err(|_| DbError::Corrupt { column, value })
}

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    requester_id: Uuid,
    provider_id: Uuid,
    service_offering_id: Option<Uuid>,
    service_name: String,
    scheduled_date: NaiveDate,
    scheduled_time: NaiveTime,
    description: String,
    contact: String,
    hourly_rate: Option<Decimal>,
    estimated_duration_hours: Option<Decimal>,
    total_amount: Option<Decimal>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = DbError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Booking {
            id: row.id,
            requester_id: row.requester_id,
            provider_id: row.provider_id,
            service_offering_id: row.service_offering_id,
            service_name: row.service_name,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time,
            description: row.description,
            contact: row.contact,
            hourly_rate: row.hourly_rate,
            estimated_duration_hours: row.estimated_duration_hours,
            total_amount: row.total_amount,
            status: parse_column::<BookingStatus>("bookings.status", row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            accepted_at: row.accepted_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ActorRow {
    id: Uuid,
    role: String,
    display_name: Option<String>,
    subscription_tier: Option<String>,
    accepted_jobs: i32,
    max_jobs: i32,
}

impl TryFrom<ActorRow> for Actor {
    type Error = DbError;

    fn try_from(row: ActorRow) -> Result<Self> {
        let quota = match row.subscription_tier {
            Some(tier) => Some(ProviderQuota {
                subscription_tier: parse_column::<SubscriptionTier>("actors.subscription_tier", tier)?,
                accepted_jobs: row.accepted_jobs,
                max_jobs: row.max_jobs,
            }),
            None => None,
        };
        Ok(Actor {
            id: row.id,
            role: parse_column::<Role>("actors.role", row.role)?,
            display_name: row.display_name,
            quota,
        })
    }
}

#[derive(Debug, FromRow)]
struct QuotaRow {
    subscription_tier: String,
    accepted_jobs: i32,
    max_jobs: i32,
}

impl TryFrom<QuotaRow> for ProviderQuota {
    type Error = DbError;

    fn try_from(row: QuotaRow) -> Result<Self> {
        Ok(ProviderQuota {
            subscription_tier: parse_column::<SubscriptionTier>("actors.subscription_tier", row.subscription_tier)?,
            accepted_jobs: row.accepted_jobs,
            max_jobs: row.max_jobs,
        })
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    sender_id: Option<Uuid>,
    title: String,
    message: String,
    notification_type: String,
    category: String,
    important: bool,
    payload: serde_json::Value,
    read: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            title: row.title,
            message: row.message,
            notification_type: parse_column::<NotificationType>("notifications.notification_type", row.notification_type)?,
            category: parse_column::<NotificationCategory>("notifications.category", row.category)?,
            important: row.important,
            payload: row.payload,
            read: row.read,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl BookingStore for PostgresStore {
    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    #[instrument(skip(self, booking), fields(booking_id = %abbrev_uuid(&booking.id)), err)]
    async fn insert(&self, booking: &Booking) -> Result<Booking> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO bookings (
                id, requester_id, provider_id, service_offering_id, service_name,
                scheduled_date, scheduled_time, description, contact,
                hourly_rate, estimated_duration_hours, total_amount,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.requester_id)
        .bind(booking.provider_id)
        .bind(booking.service_offering_id)
        .bind(&booking.service_name)
        .bind(booking.scheduled_date)
        .bind(booking.scheduled_time)
        .bind(&booking.description)
        .bind(&booking.contact)
        .bind(booking.hourly_rate)
        .bind(booking.estimated_duration_hours)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Booking::try_from(row)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id), from = %update.expected, to = %update.new_status), err)]
    async fn update_status(&self, id: BookingId, update: StatusUpdate) -> Result<Option<Booking>> {
        // Column names come from a closed enum, never from input.
        let stamp = update
            .timestamp
            .map(|field| format!(", {col} = COALESCE({col}, now())", col = field.column()))
            .unwrap_or_default();
        let query = format!(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = now(){stamp}
            WHERE id = $1 AND status = $2
            RETURNING *
            "#
        );

        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(id)
            .bind(update.expected.as_str())
            .bind(update.new_status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Booking::try_from).transpose()
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: BookingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_for_actor(&self, actor_id: Option<UserId>) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT * FROM bookings
            WHERE $1::uuid IS NULL OR requester_id = $1 OR provider_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

#[async_trait]
impl ActorDirectory for PostgresStore {
    #[instrument(skip(self), fields(actor_id = %abbrev_uuid(&id)), err)]
    async fn get_actor(&self, id: UserId) -> Result<Option<Actor>> {
        let row = sqlx::query_as::<_, ActorRow>(
            "SELECT id, role, display_name, subscription_tier, accepted_jobs, max_jobs FROM actors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Actor::try_from).transpose()
    }

    #[instrument(skip(self, actor), fields(actor_id = %abbrev_uuid(&actor.id)), err)]
    async fn upsert_actor(&self, actor: &Actor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO actors (id, role, display_name, subscription_tier, accepted_jobs, max_jobs)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                role = EXCLUDED.role,
                display_name = EXCLUDED.display_name,
                subscription_tier = EXCLUDED.subscription_tier,
                accepted_jobs = EXCLUDED.accepted_jobs,
                max_jobs = EXCLUDED.max_jobs,
                updated_at = now()
            "#,
        )
        .bind(actor.id)
        .bind(actor.role.as_str())
        .bind(&actor.display_name)
        .bind(actor.quota.map(|q| q.subscription_tier.as_str()))
        .bind(actor.quota.map_or(0, |q| q.accepted_jobs))
        .bind(actor.quota.map_or(0, |q| q.max_jobs))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VerificationGate for PostgresStore {
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn is_approved(&self, user_id: UserId) -> Result<bool> {
        let approved = sqlx::query_scalar::<_, bool>("SELECT kyc_approved FROM actors WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(approved.unwrap_or(false))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn set_approved(&self, user_id: UserId, approved: bool) -> Result<()> {
        let result = sqlx::query("UPDATE actors SET kyc_approved = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(approved)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for PostgresStore {
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id)), err)]
    async fn reserve(&self, provider_id: UserId) -> Result<ReserveOutcome> {
        let reserved = sqlx::query_as::<_, QuotaRow>(
            r#"
            UPDATE actors
            SET accepted_jobs = accepted_jobs + 1, updated_at = now()
            WHERE id = $1
              AND subscription_tier IS NOT NULL
              AND accepted_jobs < max_jobs
            RETURNING subscription_tier, accepted_jobs, max_jobs
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = reserved {
            return Ok(ReserveOutcome::Reserved(ProviderQuota::try_from(row)?));
        }

        // Nothing was written; read only to tell "full" apart from "no such provider".
        Ok(match self.quota(provider_id).await? {
            Some(quota) => ReserveOutcome::Exhausted(quota),
            None => ReserveOutcome::UnknownProvider,
        })
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id)), err)]
    async fn release(&self, provider_id: UserId) -> Result<Option<ProviderQuota>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            UPDATE actors
            SET accepted_jobs = GREATEST(accepted_jobs - 1, 0), updated_at = now()
            WHERE id = $1 AND subscription_tier IS NOT NULL
            RETURNING subscription_tier, accepted_jobs, max_jobs
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderQuota::try_from).transpose()
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id), tier = tier.as_str()), err)]
    async fn reset_for_tier(&self, provider_id: UserId, tier: SubscriptionTier, max_jobs: i32) -> Result<Option<ProviderQuota>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            UPDATE actors
            SET subscription_tier = $2, max_jobs = $3, accepted_jobs = 0, updated_at = now()
            WHERE id = $1 AND role = 'provider'
            RETURNING subscription_tier, accepted_jobs, max_jobs
            "#,
        )
        .bind(provider_id)
        .bind(tier.as_str())
        .bind(max_jobs)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderQuota::try_from).transpose()
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id)), err)]
    async fn quota(&self, provider_id: UserId) -> Result<Option<ProviderQuota>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT subscription_tier, accepted_jobs, max_jobs
            FROM actors
            WHERE id = $1 AND subscription_tier IS NOT NULL
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderQuota::try_from).transpose()
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    #[instrument(skip(self, notification), fields(recipient_id = %abbrev_uuid(&notification.recipient_id)), err)]
    async fn insert(&self, notification: &Notification) -> Result<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, title, message, notification_type,
                category, important, payload, read, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(notification.recipient_id)
        .bind(notification.sender_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.notification_type.as_str())
        .bind(notification.category.as_str())
        .bind(notification.important)
        .bind(&notification.payload)
        .bind(notification.read)
        .bind(notification.created_at)
        .bind(notification.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Notification::try_from(row)
    }

    #[instrument(skip(self, filter), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    async fn list_for_recipient(&self, recipient_id: UserId, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1
              AND expires_at > now()
              AND (NOT $2 OR read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(recipient_id)
        .bind(filter.unread_only)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    async fn mark_read(&self, id: NotificationId, recipient_id: UserId) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Notification::try_from).transpose()
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    async fn mark_all_read(&self, recipient_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND read = FALSE AND expires_at > now()")
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    async fn unread_count(&self, recipient_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = FALSE AND expires_at > now()",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: NotificationId, recipient_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
