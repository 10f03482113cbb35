//! Booking records and the closed status enumeration.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::types::{BookingId, ServiceOfferingId, UserId};

/// Status of a booking. Only the lifecycle engine moves a booking between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    InProgress,
    PendingConfirmation,
    Completed,
    Declined,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::InProgress,
        BookingStatus::PendingConfirmation,
        BookingStatus::Completed,
        BookingStatus::Declined,
        BookingStatus::Cancelled,
    ];

    /// Storage representation, identical to the serde name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined | Self::Cancelled)
    }

    /// The timestamp column stamped when a booking enters this status, if any.
    pub fn timestamp_field(&self) -> Option<StatusTimestamp> {
        match self {
            Self::Accepted => Some(StatusTimestamp::AcceptedAt),
            Self::InProgress => Some(StatusTimestamp::StartedAt),
            Self::Completed => Some(StatusTimestamp::CompletedAt),
            Self::Cancelled => Some(StatusTimestamp::CancelledAt),
            Self::Pending | Self::PendingConfirmation | Self::Declined => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::InProgress => "In Progress",
            Self::PendingConfirmation => "Pending Confirmation",
            Self::Completed => "Completed",
            Self::Declined => "Declined",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown booking status: {s}"))
    }
}

/// Per-transition timestamp columns on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTimestamp {
    AcceptedAt,
    StartedAt,
    CompletedAt,
    CancelledAt,
}

impl StatusTimestamp {
    pub fn column(&self) -> &'static str {
        match self {
            Self::AcceptedAt => "accepted_at",
            Self::StartedAt => "started_at",
            Self::CompletedAt => "completed_at",
            Self::CancelledAt => "cancelled_at",
        }
    }
}

/// Whether a booking was created against a published service listing.
///
/// Generic bookings never pass through `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Generic,
    ServiceOffering,
}

/// Database model for a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub requester_id: UserId,
    pub provider_id: UserId,
    pub service_offering_id: Option<ServiceOfferingId>,
    pub service_name: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub description: String,
    pub contact: String,
    pub hourly_rate: Option<Decimal>,
    pub estimated_duration_hours: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Build a fresh `Pending` booking from validated creation input.
    pub fn new_pending(requester_id: UserId, request: BookingCreateDBRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            requester_id,
            provider_id: request.provider_id,
            service_offering_id: request.service_offering_id,
            service_name: request.service_name,
            scheduled_date: request.scheduled_date,
            scheduled_time: request.scheduled_time,
            description: request.description,
            contact: request.contact,
            hourly_rate: request.hourly_rate,
            estimated_duration_hours: request.estimated_duration_hours,
            total_amount: request.total_amount,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    pub fn kind(&self) -> BookingKind {
        if self.service_offering_id.is_some() {
            BookingKind::ServiceOffering
        } else {
            BookingKind::Generic
        }
    }

    /// True if the actor is the requester or the provider on this booking.
    pub fn is_party(&self, actor_id: UserId) -> bool {
        self.requester_id == actor_id || self.provider_id == actor_id
    }

    /// Stamp a timestamp column. Columns already set are left untouched.
    pub fn stamp(&mut self, field: StatusTimestamp, at: DateTime<Utc>) {
        let slot = match field {
            StatusTimestamp::AcceptedAt => &mut self.accepted_at,
            StatusTimestamp::StartedAt => &mut self.started_at,
            StatusTimestamp::CompletedAt => &mut self.completed_at,
            StatusTimestamp::CancelledAt => &mut self.cancelled_at,
        };
        slot.get_or_insert(at);
    }
}

/// Validated input for a new booking.
#[derive(Debug, Clone)]
pub struct BookingCreateDBRequest {
    pub provider_id: UserId,
    pub service_offering_id: Option<ServiceOfferingId>,
    pub service_name: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub description: String,
    pub contact: String,
    pub hourly_rate: Option<Decimal>,
    pub estimated_duration_hours: Option<Decimal>,
    pub total_amount: Option<Decimal>,
}

/// Conditional status update: applies only if the stored status still equals `expected`.
#[derive(Debug, Clone, Copy)]
pub struct StatusUpdate {
    pub expected: BookingStatus,
    pub new_status: BookingStatus,
    pub timestamp: Option<StatusTimestamp>,
}

impl StatusUpdate {
    pub fn new(expected: BookingStatus, new_status: BookingStatus) -> Self {
        Self {
            expected,
            new_status,
            timestamp: new_status.timestamp_field(),
        }
    }
}
