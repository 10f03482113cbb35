//! Axum route handlers, one module per resource.
//!
//! Handlers resolve the caller with [`crate::auth::CurrentActor`], delegate to the
//! lifecycle engine or a store, and convert records into API models. Authorization
//! for bookings lives in the engine; the notification and provider handlers check
//! ownership themselves.

pub mod bookings;
pub mod notifications;
pub mod providers;
