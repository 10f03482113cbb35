//! HTTP surface.
//!
//! - **[`handlers`]**: axum route handlers
//! - **[`models`]**: request/response bodies, kept separate from the storage records
//!
//! Routes live under `/api/v1`:
//!
//! - **Bookings** (`/api/v1/bookings/*`): create, read, list, transition, delete
//! - **Notifications** (`/api/v1/notifications/*`): read surface and the SSE stream
//! - **Providers** (`/api/v1/providers/*`): subscription renewal and quota lookup
//!
//! Every route needs the trusted actor header; see [`crate::auth`].

pub mod handlers;
pub mod models;
