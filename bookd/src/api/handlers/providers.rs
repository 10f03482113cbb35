//! HTTP handlers for provider subscription and quota endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::providers::{QuotaResponse, SubscriptionUpdate},
    auth::CurrentActor,
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// Renew or change a provider's subscription.
#[utoipa::path(
    put,
    path = "/providers/{id}/subscription",
    tag = "providers",
    summary = "Renew subscription",
    description = "Start a new subscription period on the given tier. The accepted-jobs counter goes back to zero and the ceiling follows the tier. Administrators only.",
    params(("id" = uuid::Uuid, Path, description = "Provider ID")),
    request_body = SubscriptionUpdate,
    responses(
        (status = 200, description = "Quota for the new period", body = QuotaResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Caller is not an administrator", body = crate::errors::ErrorBody),
        (status = 404, description = "Provider not found", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(provider_id): Path<UserId>,
    CurrentActor(actor): CurrentActor,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<QuotaResponse>> {
    if !actor.is_admin() {
        return Err(Error::Unauthorized {
            action: "manage provider subscriptions".to_string(),
        });
    }

    let quota = state.engine.quota().renew(provider_id, update.tier).await?;
    info!(
        provider_id = %abbrev_uuid(&provider_id),
        tier = update.tier.as_str(),
        max_jobs = quota.max_jobs,
        "Provider subscription renewed"
    );
    Ok(Json(QuotaResponse::new(provider_id, quota)))
}

#[utoipa::path(
    get,
    path = "/providers/{id}/quota",
    tag = "providers",
    summary = "Get provider quota",
    description = "Accepted jobs and ceiling for the current period. Visible to the provider and administrators.",
    params(("id" = uuid::Uuid, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Current quota", body = QuotaResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Caller is neither the provider nor an administrator", body = crate::errors::ErrorBody),
        (status = 404, description = "Provider not found", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn get_quota(
    State(state): State<AppState>,
    Path(provider_id): Path<UserId>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<QuotaResponse>> {
    if !(actor.is_admin() || actor.id == provider_id) {
        return Err(Error::Unauthorized {
            action: "view this provider's quota".to_string(),
        });
    }

    let quota = state.engine.quota().quota(provider_id).await?;
    Ok(Json(QuotaResponse::new(provider_id, quota)))
}
