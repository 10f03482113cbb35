//! Database record structures.

pub mod actors;
pub mod bookings;
pub mod notifications;
