//! HTTP handlers for booking endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use tracing::instrument;

use crate::{
    AppState,
    api::models::bookings::{BookingCreate, BookingResponse, BookingStatusChange, ListBookingsQuery},
    auth::CurrentActor,
    errors::Result,
    types::BookingId,
};

/// Create a booking as the calling requester.
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    summary = "Create booking",
    description = "Create a Pending booking. The caller must be a requester with approved identity verification; the provider is notified.",
    request_body = BookingCreate,
    responses(
        (status = 201, description = "Booking created", body = BookingResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Not a requester, or verification not approved", body = crate::errors::ErrorBody),
        (status = 404, description = "Provider not found", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn create_booking(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<BookingCreate>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let booking = state.engine.create_booking(&actor, request.into()).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// List bookings the caller is party to.
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    summary = "List bookings",
    description = "Bookings where the caller is requester or provider, newest first. Administrators may pass `all=true`.",
    params(ListBookingsQuery),
    responses(
        (status = 200, description = "Bookings", body = [BookingResponse]),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "`all` requested by a non-administrator", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<BookingResponse>>> {
    let bookings = state.engine.list_bookings(&actor, query.all).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "bookings",
    summary = "Get booking",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking", body = BookingResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Caller is not a party to the booking", body = crate::errors::ErrorBody),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<BookingResponse>> {
    let booking = state.engine.get_booking(id, &actor).await?;
    Ok(Json(booking.into()))
}

/// Move a booking to a new status.
#[utoipa::path(
    patch,
    path = "/bookings/{id}/status",
    tag = "bookings",
    summary = "Change booking status",
    description = "Apply one transition. Accepting checks the provider's verification and takes a quota slot; both parties are notified according to who made the change.",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    request_body = BookingStatusChange,
    responses(
        (status = 200, description = "Booking after the transition", body = BookingResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Caller may not make this change, or the provider is not verified", body = crate::errors::ErrorBody),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorBody),
        (status = 409, description = "Transition not allowed from the current status, or the provider's quota is used up", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    CurrentActor(actor): CurrentActor,
    Json(change): Json<BookingStatusChange>,
) -> Result<Json<BookingResponse>> {
    let booking = state.engine.transition_booking(id, &actor, change.status).await?;
    Ok(Json(booking.into()))
}

#[utoipa::path(
    delete,
    path = "/bookings/{id}",
    tag = "bookings",
    summary = "Delete booking",
    description = "Hard-delete a booking. Only the requester or an administrator may do this. No notification is sent and quota is unaffected.",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 204, description = "Booking deleted"),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 403, description = "Caller may not delete this booking", body = crate::errors::ErrorBody),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    CurrentActor(actor): CurrentActor,
) -> Result<StatusCode> {
    state.engine.delete_booking(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::api::models::bookings::BookingResponse;
    use crate::db::models::{actors::Role, bookings::BookingStatus, notifications::Notification};
    use crate::test::utils::{
        ACTOR_HEADER, actor_header, booking_body, create_test_actor, create_test_app, create_test_app_with_config, create_test_config,
    };

    #[tokio::test]
    async fn test_create_booking_notifies_provider() {
        let (server, stores, _bg) = create_test_app();
        let requester = create_test_actor(&stores, Role::Requester, true).await;
        let provider = create_test_actor(&stores, Role::Provider, true).await;

        let (name, value) = actor_header(&requester);
        let response = server.post("/api/v1/bookings").add_header(name, value).json(&booking_body(provider.id)).await;
        response.assert_status(StatusCode::CREATED);
        let created: BookingResponse = response.json();
        assert_eq!(created.requester_id, requester.id);
        assert_eq!(created.status, BookingStatus::Pending);
        assert_eq!(created.total_amount, Some("90.00".parse().unwrap()));

        let (name, value) = actor_header(&provider);
        let inbox: Vec<Notification> = server.get("/api/v1/notifications").add_header(name, value).await.json();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].payload["bookingId"], json!(created.id));
    }

    #[tokio::test]
    async fn test_identity_header_is_required() {
        let (server, stores, _bg) = create_test_app();
        let provider = create_test_actor(&stores, Role::Provider, true).await;

        let response = server.post("/api/v1/bookings").json(&booking_body(provider.id)).await;
        response.assert_status_unauthorized();
        let body: Value = response.json();
        assert_eq!(body["code"], "unauthenticated");

        server
            .get("/api/v1/bookings")
            .add_header(ACTOR_HEADER, "not-a-uuid")
            .await
            .assert_status_unauthorized();
        server
            .get("/api/v1/bookings")
            .add_header(ACTOR_HEADER, uuid::Uuid::new_v4().to_string())
            .await
            .assert_status_unauthorized();
    }

    #[tokio::test]
    async fn test_create_booking_rejections() {
        let (server, stores, _bg) = create_test_app();
        let unverified = create_test_actor(&stores, Role::Requester, false).await;
        let requester = create_test_actor(&stores, Role::Requester, true).await;
        let provider = create_test_actor(&stores, Role::Provider, true).await;

        let (name, value) = actor_header(&unverified);
        let response = server.post("/api/v1/bookings").add_header(name, value).json(&booking_body(provider.id)).await;
        response.assert_status_forbidden();
        assert_eq!(response.json::<Value>()["code"], "not_verified");

        let (name, value) = actor_header(&provider);
        let response = server.post("/api/v1/bookings").add_header(name, value).json(&booking_body(provider.id)).await;
        response.assert_status_forbidden();
        assert_eq!(response.json::<Value>()["code"], "unauthorized");

        let mut body = booking_body(provider.id);
        body["service_name"] = json!("  ");
        let (name, value) = actor_header(&requester);
        let response = server.post("/api/v1/bookings").add_header(name, value.clone()).json(&body).await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["code"], "validation_error");

        // A requester is not a provider.
        let response = server
            .post("/api/v1/bookings")
            .add_header(name, value)
            .json(&booking_body(unverified.id))
            .await;
        response.assert_status_not_found();

        assert!(stores.bookings.list_for_actor(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_a_conflict() {
        let mut config = create_test_config();
        config.quota.free_max_jobs = 1;
        let (server, stores, _bg) = create_test_app_with_config(config);
        let requester = create_test_actor(&stores, Role::Requester, true).await;
        // Seeded with the default ceiling of 3; renew to pick up the configured one.
        let provider = create_test_actor(&stores, Role::Provider, true).await;
        stores
            .quotas
            .reset_for_tier(provider.id, crate::db::models::actors::SubscriptionTier::Free, 1)
            .await
            .unwrap();

        let (req_name, req_value) = actor_header(&requester);
        let mut ids = Vec::new();
        for _ in 0..2 {
            let booking: BookingResponse = server
                .post("/api/v1/bookings")
                .add_header(req_name, req_value.clone())
                .json(&booking_body(provider.id))
                .await
                .json();
            ids.push(booking.id);
        }

        let (name, value) = actor_header(&provider);
        server
            .patch(&format!("/api/v1/bookings/{}/status", ids[0]))
            .add_header(name, value.clone())
            .json(&json!({ "status": "accepted" }))
            .await
            .assert_status_ok();

        let response = server
            .patch(&format!("/api/v1/bookings/{}/status", ids[1]))
            .add_header(name, value.clone())
            .json(&json!({ "status": "accepted" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["code"], "quota_exceeded");

        // Declining still works with no slots left.
        let declined: BookingResponse = server
            .patch(&format!("/api/v1/bookings/{}/status", ids[1]))
            .add_header(name, value)
            .json(&json!({ "status": "declined" }))
            .await
            .json();
        assert_eq!(declined.status, BookingStatus::Declined);
    }

    #[tokio::test]
    async fn test_requester_may_only_cancel() {
        let (server, stores, _bg) = create_test_app();
        let requester = create_test_actor(&stores, Role::Requester, true).await;
        let provider = create_test_actor(&stores, Role::Provider, true).await;

        let (name, value) = actor_header(&requester);
        let booking: BookingResponse = server
            .post("/api/v1/bookings")
            .add_header(name, value.clone())
            .json(&booking_body(provider.id))
            .await
            .json();

        server
            .patch(&format!("/api/v1/bookings/{}/status", booking.id))
            .add_header(name, value.clone())
            .json(&json!({ "status": "accepted" }))
            .await
            .assert_status_forbidden();

        let cancelled: BookingResponse = server
            .patch(&format!("/api/v1/bookings/{}/status", booking.id))
            .add_header(name, value)
            .json(&json!({ "status": "cancelled" }))
            .await
            .json();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn test_read_and_delete_access() {
        let (server, stores, _bg) = create_test_app();
        let requester = create_test_actor(&stores, Role::Requester, true).await;
        let provider = create_test_actor(&stores, Role::Provider, true).await;
        let stranger = create_test_actor(&stores, Role::Requester, true).await;
        let admin = create_test_actor(&stores, Role::Admin, true).await;

        let (req_name, req_value) = actor_header(&requester);
        let booking: BookingResponse = server
            .post("/api/v1/bookings")
            .add_header(req_name, req_value.clone())
            .json(&booking_body(provider.id))
            .await
            .json();
        let path = format!("/api/v1/bookings/{}", booking.id);

        let (name, value) = actor_header(&stranger);
        server.get(&path).add_header(name, value.clone()).await.assert_status_forbidden();
        let listed: Vec<BookingResponse> = server.get("/api/v1/bookings").add_header(name, value.clone()).await.json();
        assert!(listed.is_empty());
        server
            .get("/api/v1/bookings?all=true")
            .add_header(name, value)
            .await
            .assert_status_forbidden();

        let (name, value) = actor_header(&admin);
        let everything: Vec<BookingResponse> = server.get("/api/v1/bookings?all=true").add_header(name, value).await.json();
        assert_eq!(everything.len(), 1);

        let (name, value) = actor_header(&provider);
        server.get(&path).add_header(name, value.clone()).await.assert_status_ok();
        server.delete(&path).add_header(name, value).await.assert_status_forbidden();

        server
            .delete(&path)
            .add_header(req_name, req_value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server.get(&path).add_header(req_name, req_value).await.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected_before_the_engine() {
        let (server, stores, _bg) = create_test_app();
        let provider = create_test_actor(&stores, Role::Provider, true).await;

        let (name, value) = actor_header(&provider);
        let response = server
            .patch(&format!("/api/v1/bookings/{}/status", uuid::Uuid::new_v4()))
            .add_header(name, value.clone())
            .json(&json!({ "status": "teleported" }))
            .await;
        assert!(response.status_code().is_client_error());

        server
            .patch(&format!("/api/v1/bookings/{}/status", uuid::Uuid::new_v4()))
            .add_header(name, value)
            .json(&json!({ "status": "accepted" }))
            .await
            .assert_status_not_found();
    }
}
