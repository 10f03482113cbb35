//! Persistence layer.
//!
//! ```text
//! ┌──────────────────┐
//! │ Lifecycle engine │  (lifecycle, quota, notifications)
//! └────────┬─────────┘
//!          │  trait objects
//!          ↓
//! ┌──────────────────┐
//! │   db::handlers   │  (storage contracts + in-memory / Postgres backends)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │    db::models    │  (records)
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: storage traits and their two implementations
//! - [`models`]: booking, actor and notification records
//! - [`errors`]: storage error type
//!
//! The core never names a backend; it receives a [`Stores`] bundle of trait objects
//! built once at startup from the `database` config section.

use std::sync::Arc;

use sqlx::PgPool;

use handlers::{ActorDirectory, BookingStore, InMemoryStore, NotificationStore, PostgresStore, QuotaStore, VerificationGate};

pub mod errors;
pub mod handlers;
pub mod models;

/// Every storage contract the application consumes, backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub bookings: Arc<dyn BookingStore>,
    pub actors: Arc<dyn ActorDirectory>,
    pub verification: Arc<dyn VerificationGate>,
    pub quotas: Arc<dyn QuotaStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryStore::new())
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::from_backend(PostgresStore::new(pool))
    }

    /// Share one backend across all contracts.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: BookingStore + ActorDirectory + VerificationGate + QuotaStore + NotificationStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            bookings: backend.clone(),
            actors: backend.clone(),
            verification: backend.clone(),
            quotas: backend.clone(),
            notifications: backend,
        }
    }
}
