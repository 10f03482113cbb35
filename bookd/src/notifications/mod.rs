//! Durable notifications with best-effort real-time delivery.
//!
//! - [`registry`]: live connections per recipient
//! - [`templates`]: status → title/type/importance mapping
//! - [`dispatcher`]: persist-then-push entry point used by the lifecycle engine
//! - [`retry`]: background retry of failed persistence attempts
//! - [`sweeper`]: background purge of expired records

pub mod dispatcher;
pub mod registry;
pub mod retry;
pub mod sweeper;
pub mod templates;

pub use dispatcher::NotificationDispatcher;
pub use registry::{ConnectionGuard, ConnectionRegistry};
