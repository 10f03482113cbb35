//! Fixed status → notification content mapping.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::db::models::{
    bookings::{Booking, BookingStatus},
    notifications::{Notification, NotificationCategory, NotificationType},
};
use crate::types::UserId;

/// Presentation of a status change, keyed only by the new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTemplate {
    pub title: &'static str,
    pub notification_type: NotificationType,
    pub important: bool,
}

pub fn status_template(status: BookingStatus) -> StatusTemplate {
    let (title, notification_type, important) = match status {
        BookingStatus::Accepted => ("Job Accepted", NotificationType::Success, true),
        BookingStatus::Declined => ("Job Declined", NotificationType::Error, true),
        BookingStatus::PendingConfirmation => ("Job Awaiting Confirmation", NotificationType::Warning, true),
        BookingStatus::InProgress => ("Job Started", NotificationType::Info, false),
        BookingStatus::Completed => ("Job Completed", NotificationType::Info, false),
        BookingStatus::Cancelled => ("Job Cancelled", NotificationType::Info, false),
        BookingStatus::Pending => ("Job Pending", NotificationType::Info, false),
    };
    StatusTemplate {
        title,
        notification_type,
        important,
    }
}

fn new_record(recipient_id: UserId, sender_id: Option<UserId>, now: DateTime<Utc>, retention: chrono::Duration) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient_id,
        sender_id,
        title: String::new(),
        message: String::new(),
        notification_type: NotificationType::Info,
        category: NotificationCategory::JobStatus,
        important: false,
        payload: serde_json::Value::Null,
        read: false,
        created_at: now,
        expires_at: now + retention,
    }
}

/// Notification for one recipient of a status change.
pub fn status_change(
    booking: &Booking,
    new_status: BookingStatus,
    recipient_id: UserId,
    sender_id: Option<UserId>,
    retention: chrono::Duration,
) -> Notification {
    let template = status_template(new_status);
    Notification {
        title: template.title.to_string(),
        message: format!(
            "Booking for {} on {} at {} is now {}",
            booking.service_name,
            booking.scheduled_date,
            booking.scheduled_time.format("%H:%M"),
            new_status
        ),
        notification_type: template.notification_type,
        important: template.important,
        payload: json!({
            "bookingId": booking.id,
            "newStatus": new_status,
            "serviceName": booking.service_name,
        }),
        ..new_record(recipient_id, sender_id, Utc::now(), retention)
    }
}

/// Notification to the provider that a booking was requested.
pub fn booking_created(booking: &Booking, retention: chrono::Duration) -> Notification {
    Notification {
        title: "New Booking Request".to_string(),
        message: format!(
            "New request for {} on {} at {}",
            booking.service_name,
            booking.scheduled_date,
            booking.scheduled_time.format("%H:%M")
        ),
        payload: json!({
            "bookingId": booking.id,
            "newStatus": booking.status,
            "serviceName": booking.service_name,
        }),
        ..new_record(booking.provider_id, Some(booking.requester_id), Utc::now(), retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::bookings::BookingCreateDBRequest;
    use chrono::{NaiveDate, NaiveTime};

    fn booking() -> Booking {
        Booking::new_pending(
            Uuid::new_v4(),
            BookingCreateDBRequest {
                provider_id: Uuid::new_v4(),
                service_offering_id: Some(Uuid::new_v4()),
                service_name: "Deep clean".to_string(),
                scheduled_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                scheduled_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                description: "Two bedroom flat".to_string(),
                contact: "jo@example.com".to_string(),
                hourly_rate: None,
                estimated_duration_hours: None,
                total_amount: None,
            },
        )
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_template(BookingStatus::Accepted),
            StatusTemplate {
                title: "Job Accepted",
                notification_type: NotificationType::Success,
                important: true
            }
        );
        assert_eq!(status_template(BookingStatus::Declined).notification_type, NotificationType::Error);
        assert!(status_template(BookingStatus::Declined).important);
        assert_eq!(status_template(BookingStatus::PendingConfirmation).notification_type, NotificationType::Warning);
        for status in [BookingStatus::InProgress, BookingStatus::Completed, BookingStatus::Cancelled] {
            let template = status_template(status);
            assert_eq!(template.notification_type, NotificationType::Info);
            assert!(!template.important);
        }
    }

    #[test]
    fn test_status_change_payload_and_expiry() {
        let booking = booking();
        let sender = booking.provider_id;
        let n = status_change(&booking, BookingStatus::Accepted, booking.requester_id, Some(sender), chrono::Duration::days(30));

        assert_eq!(n.recipient_id, booking.requester_id);
        assert_eq!(n.sender_id, Some(sender));
        assert_eq!(n.category, NotificationCategory::JobStatus);
        assert_eq!(n.payload["bookingId"], json!(booking.id));
        assert_eq!(n.payload["newStatus"], json!("accepted"));
        assert_eq!(n.expires_at - n.created_at, chrono::Duration::days(30));
        assert!(!n.read);
        assert_eq!(n.message, "Booking for Deep clean on 2026-12-01 at 14:00 is now Accepted");
    }

    #[test]
    fn test_booking_created_goes_to_provider() {
        let booking = booking();
        let n = booking_created(&booking, chrono::Duration::days(30));
        assert_eq!(n.recipient_id, booking.provider_id);
        assert_eq!(n.notification_type, NotificationType::Info);
        assert_eq!(n.payload["newStatus"], json!("pending"));
    }
}
