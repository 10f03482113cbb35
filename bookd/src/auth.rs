//! Caller identity.
//!
//! Credentials are validated upstream. The fronting proxy sets the configured
//! actor header (`auth.actor_header`, `x-bookd-actor` by default) to the caller's
//! user ID, and [`CurrentActor`] resolves that ID through the [`ActorDirectory`].
//!
//! [`ActorDirectory`]: crate::db::handlers::ActorDirectory

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    AppState,
    db::models::actors::Actor,
    errors::{Error, Result},
    types::abbrev_uuid,
};

/// The actor making the request. Rejects with 401 when the header is missing,
/// malformed or names an actor the directory does not know.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header_name = state.config.auth.actor_header.as_str();
        let raw = parts.headers.get(header_name).ok_or_else(|| Error::Unauthenticated {
            message: Some(format!("Missing {header_name} header")),
        })?;

        let actor_id = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| Error::Unauthenticated {
                message: Some(format!("{header_name} header is not a valid user ID")),
            })?;

        let actor = state.stores.actors.get_actor(actor_id).await?.ok_or_else(|| {
            debug!(actor_id = %abbrev_uuid(&actor_id), "Unknown actor on request");
            Error::Unauthenticated {
                message: Some("Unknown actor".to_string()),
            }
        })?;

        Ok(CurrentActor(actor))
    }
}
