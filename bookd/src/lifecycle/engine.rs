//! Booking lifecycle orchestration.
//!
//! ```text
//! transition_booking(booking_id, actor, target)
//!   ├─ BookingStore::get()                       // NotFound
//!   ├─ authorize(actor, booking, target)         // Unauthorized, nothing touched yet
//!   ├─ transitions::is_allowed()                 // InvalidTransition
//!   ├─ target == Accepted:
//!   │    ├─ VerificationGate::is_approved(provider)   // NotVerified
//!   │    └─ QuotaLedger::reserve(provider)            // QuotaExceeded
//!   ├─ BookingStore::update_status(expected = current)
//!   │    ├─ applied → continue
//!   │    └─ stale / failed → release reservation, return error
//!   └─ NotificationDispatcher::notify_status_change() per recipient
//! ```
//!
//! No lock is held across any of these calls. The conditional status update is the
//! per-booking serialization point and the quota reservation the per-provider one.

use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::transitions;
use crate::db::Stores;
use crate::db::handlers::{ActorDirectory, BookingStore, VerificationGate};
use crate::db::models::{
    actors::{Actor, Role},
    bookings::{Booking, BookingCreateDBRequest, BookingStatus, StatusUpdate},
};
use crate::errors::{Error, Result};
use crate::notifications::NotificationDispatcher;
use crate::quota::QuotaLedger;
use crate::types::{BookingId, UserId, abbrev_uuid};

#[derive(Clone)]
pub struct BookingLifecycleEngine {
    bookings: Arc<dyn BookingStore>,
    actors: Arc<dyn ActorDirectory>,
    verification: Arc<dyn VerificationGate>,
    quota: QuotaLedger,
    dispatcher: NotificationDispatcher,
}

fn booking_not_found(id: BookingId) -> Error {
    Error::NotFound {
        resource: "Booking".to_string(),
        id: id.to_string(),
    }
}

fn require_present(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation {
            message: format!("{field} is required"),
        });
    }
    Ok(())
}

impl BookingLifecycleEngine {
    pub fn new(stores: &Stores, quota: QuotaLedger, dispatcher: NotificationDispatcher) -> Self {
        Self {
            bookings: stores.bookings.clone(),
            actors: stores.actors.clone(),
            verification: stores.verification.clone(),
            quota,
            dispatcher,
        }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    /// Create a `Pending` booking on behalf of `requester` and tell the provider.
    #[instrument(skip(self, requester, request), fields(requester_id = %abbrev_uuid(&requester.id), provider_id = %abbrev_uuid(&request.provider_id)), err)]
    pub async fn create_booking(&self, requester: &Actor, request: BookingCreateDBRequest) -> Result<Booking> {
        if requester.role != Role::Requester {
            return Err(Error::Unauthorized {
                action: "create bookings".to_string(),
            });
        }

        require_present(&request.service_name, "service_name")?;
        require_present(&request.description, "description")?;
        require_present(&request.contact, "contact")?;
        if request.provider_id == requester.id {
            return Err(Error::Validation {
                message: "A booking cannot name its requester as provider".to_string(),
            });
        }
        for (field, value) in [
            ("hourly_rate", request.hourly_rate),
            ("estimated_duration_hours", request.estimated_duration_hours),
            ("total_amount", request.total_amount),
        ] {
            if value.is_some_and(|v| v.is_sign_negative()) {
                return Err(Error::Validation {
                    message: format!("{field} cannot be negative"),
                });
            }
        }

        if !self.verification.is_approved(requester.id).await? {
            return Err(Error::NotVerified { user_id: requester.id });
        }

        match self.actors.get_actor(request.provider_id).await? {
            Some(provider) if provider.is_provider() => {}
            _ => {
                return Err(Error::NotFound {
                    resource: "Provider".to_string(),
                    id: request.provider_id.to_string(),
                });
            }
        }

        let booking = self.bookings.insert(&Booking::new_pending(requester.id, request)).await?;
        info!(booking_id = %abbrev_uuid(&booking.id), kind = ?booking.kind(), "Booking created");

        self.dispatcher.notify_booking_created(&booking).await;
        Ok(booking)
    }

    /// Move a booking to `target`, enforcing role, table, KYC and quota rules.
    #[instrument(skip(self, actor), fields(booking_id = %abbrev_uuid(&booking_id), actor_id = %abbrev_uuid(&actor.id), to = %target), err)]
    pub async fn transition_booking(&self, booking_id: BookingId, actor: &Actor, target: BookingStatus) -> Result<Booking> {
        let booking = self.bookings.get(booking_id).await?.ok_or_else(|| booking_not_found(booking_id))?;

        authorize_transition(actor, &booking, target)?;

        let kind = booking.kind();
        if !transitions::is_allowed(kind, booking.status, target) {
            return Err(Error::InvalidTransition {
                from: booking.status,
                to: target,
                allowed: transitions::allowed_successors(kind, booking.status),
            });
        }

        // Acceptance is gated on the provider, whoever performs it.
        let reserved = if target == BookingStatus::Accepted {
            if !self.verification.is_approved(booking.provider_id).await? {
                return Err(Error::NotVerified {
                    user_id: booking.provider_id,
                });
            }
            self.quota.reserve(booking.provider_id).await?;
            true
        } else {
            false
        };

        let applied = self
            .bookings
            .update_status(booking_id, StatusUpdate::new(booking.status, target))
            .await;

        let updated = match applied {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.compensate(reserved, &booking).await?;
                return Err(self.stale_transition_error(booking_id, target).await);
            }
            Err(e) => {
                self.compensate(reserved, &booking).await?;
                return Err(e.into());
            }
        };

        counter!("bookd_booking_transitions_total", "to" => target.as_str()).increment(1);
        info!(from = %booking.status, to = %target, "Booking transitioned");

        for recipient_id in notification_recipients(actor, &updated) {
            self.dispatcher
                .notify_status_change(&updated, target, recipient_id, Some(actor.id))
                .await;
        }

        Ok(updated)
    }

    /// Undo a reservation taken for a transition that did not persist.
    async fn compensate(&self, reserved: bool, booking: &Booking) -> Result<()> {
        if !reserved {
            return Ok(());
        }
        if let Err(e) = self.quota.release(booking.provider_id).await {
            counter!("bookd_quota_compensation_failures_total").increment(1);
            error!(
                booking_id = %booking.id,
                provider_id = %booking.provider_id,
                error = %e,
                "Quota reservation could not be released; accepted_jobs is over-counted and needs manual correction"
            );
            return Err(Error::QuotaInconsistency {
                provider_id: booking.provider_id,
                booking_id: booking.id,
            });
        }
        Ok(())
    }

    /// The conditional update lost: report against the status the booking has now.
    async fn stale_transition_error(&self, booking_id: BookingId, target: BookingStatus) -> Error {
        match self.bookings.get(booking_id).await {
            Ok(Some(current)) => Error::InvalidTransition {
                from: current.status,
                to: target,
                allowed: transitions::allowed_successors(current.kind(), current.status),
            },
            Ok(None) => booking_not_found(booking_id),
            Err(e) => e.into(),
        }
    }

    /// Hard-delete a booking. Not a transition: no quota change, no notification.
    #[instrument(skip(self, actor), fields(booking_id = %abbrev_uuid(&booking_id), actor_id = %abbrev_uuid(&actor.id)), err)]
    pub async fn delete_booking(&self, booking_id: BookingId, actor: &Actor) -> Result<()> {
        let booking = self.bookings.get(booking_id).await?.ok_or_else(|| booking_not_found(booking_id))?;

        if !(actor.is_admin() || actor.id == booking.requester_id) {
            return Err(Error::Unauthorized {
                action: "delete this booking".to_string(),
            });
        }

        if !self.bookings.delete(booking_id).await? {
            return Err(booking_not_found(booking_id));
        }
        info!(status = %booking.status, "Booking deleted");
        Ok(())
    }

    pub async fn get_booking(&self, booking_id: BookingId, actor: &Actor) -> Result<Booking> {
        let booking = self.bookings.get(booking_id).await?.ok_or_else(|| booking_not_found(booking_id))?;
        if !(actor.is_admin() || booking.is_party(actor.id)) {
            return Err(Error::Unauthorized {
                action: "view this booking".to_string(),
            });
        }
        Ok(booking)
    }

    /// Bookings the actor is party to; administrators may ask for every booking.
    pub async fn list_bookings(&self, actor: &Actor, all: bool) -> Result<Vec<Booking>> {
        let scope = match (all, actor.is_admin()) {
            (true, true) => None,
            (true, false) => {
                return Err(Error::Unauthorized {
                    action: "list all bookings".to_string(),
                });
            }
            (false, _) => Some(actor.id),
        };
        Ok(self.bookings.list_for_actor(scope).await?)
    }
}

/// The assigned provider and administrators may make any table transition; the
/// requester may only cancel.
fn authorize_transition(actor: &Actor, booking: &Booking, target: BookingStatus) -> Result<()> {
    if actor.is_admin() || actor.id == booking.provider_id {
        return Ok(());
    }
    if actor.id == booking.requester_id {
        if target == BookingStatus::Cancelled {
            return Ok(());
        }
        return Err(Error::Unauthorized {
            action: format!("move this booking to {target}; requesters may only cancel"),
        });
    }
    Err(Error::Unauthorized {
        action: "change the status of this booking".to_string(),
    })
}

/// Counterparty of the actor, or both parties when an administrator acted.
fn notification_recipients(actor: &Actor, booking: &Booking) -> Vec<UserId> {
    if actor.is_admin() {
        vec![booking.requester_id, booking.provider_id]
    } else if actor.id == booking.provider_id {
        vec![booking.requester_id]
    } else {
        vec![booking.provider_id]
    }
}
