//! API request and response models for booking endpoints.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::bookings::{Booking, BookingCreateDBRequest, BookingKind, BookingStatus};
use crate::types::{BookingId, ServiceOfferingId, UserId};

/// Request to create a booking. The requester is always the calling actor.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingCreate {
    /// Provider who will do the job
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: UserId,
    /// Published listing the booking is made against; omit for a generic booking
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_offering_id: Option<ServiceOfferingId>,
    #[serde(default)]
    pub service_name: String,
    pub scheduled_date: NaiveDate,
    #[schema(value_type = String, example = "09:30:00")]
    pub scheduled_time: NaiveTime,
    #[serde(default)]
    pub description: String,
    /// Phone number or other contact detail for the provider
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    #[serde(default)]
    pub estimated_duration_hours: Option<Decimal>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
}

impl From<BookingCreate> for BookingCreateDBRequest {
    fn from(create: BookingCreate) -> Self {
        Self {
            provider_id: create.provider_id,
            service_offering_id: create.service_offering_id,
            service_name: create.service_name.trim().to_string(),
            scheduled_date: create.scheduled_date,
            scheduled_time: create.scheduled_time,
            description: create.description,
            contact: create.contact.trim().to_string(),
            hourly_rate: create.hourly_rate,
            estimated_duration_hours: create.estimated_duration_hours,
            total_amount: create.total_amount,
        }
    }
}

/// Request to move a booking to a new status.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingStatusChange {
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListBookingsQuery {
    /// List every booking rather than the caller's own (administrators only)
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    #[schema(value_type = String, format = "uuid")]
    pub requester_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_offering_id: Option<ServiceOfferingId>,
    pub kind: BookingKind,
    pub service_name: String,
    pub scheduled_date: NaiveDate,
    #[schema(value_type = String, example = "09:30:00")]
    pub scheduled_time: NaiveTime,
    pub description: String,
    pub contact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_hours: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            kind: booking.kind(),
            id: booking.id,
            requester_id: booking.requester_id,
            provider_id: booking.provider_id,
            service_offering_id: booking.service_offering_id,
            service_name: booking.service_name,
            scheduled_date: booking.scheduled_date,
            scheduled_time: booking.scheduled_time,
            description: booking.description,
            contact: booking.contact,
            hourly_rate: booking.hourly_rate,
            estimated_duration_hours: booking.estimated_duration_hours,
            total_amount: booking.total_amount,
            status: booking.status,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
            accepted_at: booking.accepted_at,
            started_at: booking.started_at,
            completed_at: booking.completed_at,
            cancelled_at: booking.cancelled_at,
        }
    }
}
