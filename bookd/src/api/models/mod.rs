//! API request and response models.
//!
//! - [`bookings`]: booking creation, status change and listing
//! - [`notifications`]: notification listing and counters
//! - [`providers`]: subscription renewal and quota views

pub mod bookings;
pub mod notifications;
pub mod providers;
