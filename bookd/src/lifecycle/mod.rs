//! Booking state machine: the static transition table and the engine that applies it.

pub mod engine;
pub mod transitions;

pub use engine::BookingLifecycleEngine;
