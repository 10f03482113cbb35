//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability at call sites:
//!
//! - [`UserId`]: actor (requester, provider or administrator) identifier
//! - [`BookingId`]: booking identifier
//! - [`NotificationId`]: notification record identifier
//! - [`ServiceOfferingId`]: published service listing a booking can be created against
//! - [`ConnectionId`]: one live real-time channel of a connected recipient

use uuid::Uuid;

pub type UserId = Uuid;
pub type BookingId = Uuid;
pub type NotificationId = Uuid;
pub type ServiceOfferingId = Uuid;
pub type ConnectionId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
