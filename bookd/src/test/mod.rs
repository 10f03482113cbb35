pub mod utils;

use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::{
    Application,
    api::models::{bookings::BookingResponse, providers::QuotaResponse},
    config::SeedActor,
    db::models::{
        actors::{Role, SubscriptionTier},
        bookings::BookingStatus,
        notifications::Notification,
    },
};
use utils::{ACTOR_HEADER, actor_header, booking_body, create_test_actor, create_test_app, create_test_app_with_config, create_test_config};

fn seed(role: Role, kyc_approved: bool, tier: Option<SubscriptionTier>) -> SeedActor {
    SeedActor {
        id: uuid::Uuid::new_v4(),
        role,
        display_name: None,
        kyc_approved,
        tier,
    }
}

#[tokio::test]
async fn test_fresh_server_serves_seeded_actors() {
    let provider = seed(Role::Provider, true, Some(SubscriptionTier::Free));
    let requester = seed(Role::Requester, true, None);
    let mut config = create_test_config();
    config.actors = vec![provider.clone(), requester.clone()];

    let (server, _bg) = Application::new(config).await.unwrap().into_test_server();

    server
        .get("/api/v1/bookings")
        .add_header(ACTOR_HEADER, uuid::Uuid::new_v4().to_string())
        .await
        .assert_status_unauthorized();

    let booking: BookingResponse = server
        .post("/api/v1/bookings")
        .add_header(ACTOR_HEADER, requester.id.to_string())
        .json(&booking_body(provider.id))
        .await
        .json();
    server
        .patch(&format!("/api/v1/bookings/{}/status", booking.id))
        .add_header(ACTOR_HEADER, provider.id.to_string())
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status_ok();

    let quota: QuotaResponse = server
        .get(&format!("/api/v1/providers/{}/quota", provider.id))
        .add_header(ACTOR_HEADER, provider.id.to_string())
        .await
        .json();
    assert_eq!(quota.accepted_jobs, 1);
    assert_eq!(quota.max_jobs, 3);
}

#[tokio::test]
async fn test_seeding_leaves_existing_actors_alone() {
    let (_server, stores, _bg) = create_test_app();
    let existing = create_test_actor(&stores, Role::Provider, false).await;
    stores.quotas.reserve(existing.id).await.unwrap();

    let mut config = create_test_config();
    config.actors = vec![
        SeedActor {
            id: existing.id,
            ..seed(Role::Provider, true, Some(SubscriptionTier::Premium))
        },
        seed(Role::Admin, false, None),
    ];
    crate::seed_actors(&config, &stores).await.unwrap();

    let quota = stores.quotas.quota(existing.id).await.unwrap().unwrap();
    assert_eq!(quota.subscription_tier, SubscriptionTier::Free);
    assert_eq!(quota.accepted_jobs, 1);
    assert!(!stores.verification.is_approved(existing.id).await.unwrap());

    let admin = stores.actors.get_actor(config.actors[1].id).await.unwrap().unwrap();
    assert!(admin.is_admin());
    assert!(admin.quota.is_none());
}

#[tokio::test]
async fn test_healthz_and_openapi_are_public() {
    let (server, _stores, _bg) = create_test_app();

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");

    let doc: Value = server.get("/api-docs/openapi.json").await.json();
    assert!(doc["paths"]["/bookings/{id}/status"]["patch"].is_object());
}

#[tokio::test]
async fn test_metrics_route_only_when_enabled() {
    let (server, _stores, _bg) = create_test_app();
    server.get("/internal/metrics").await.assert_status_not_found();

    let mut config = create_test_config();
    config.enable_metrics = true;
    let (server, stores, _bg) = create_test_app_with_config(config);
    let requester = create_test_actor(&stores, Role::Requester, true).await;
    let provider = create_test_actor(&stores, Role::Provider, true).await;

    let (name, value) = actor_header(&requester);
    let booking: BookingResponse = server
        .post("/api/v1/bookings")
        .add_header(name, value)
        .json(&booking_body(provider.id))
        .await
        .json();
    let (name, value) = actor_header(&provider);
    server
        .patch(&format!("/api/v1/bookings/{}/status", booking.id))
        .add_header(name, value)
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status_ok();

    let response = server.get("/internal/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("bookd_booking_transitions_total"));
}

/// A booking walked from request to completion over HTTP, checking what each party
/// sees along the way.
#[test_log::test(tokio::test)]
async fn test_booking_journey_end_to_end() {
    let (server, stores, bg) = create_test_app();
    let requester = create_test_actor(&stores, Role::Requester, true).await;
    let provider = create_test_actor(&stores, Role::Provider, true).await;
    let (req_name, req_value) = actor_header(&requester);
    let (prov_name, prov_value) = actor_header(&provider);

    let mut body = booking_body(provider.id);
    body["service_offering_id"] = json!(uuid::Uuid::new_v4());
    let response = server
        .post("/api/v1/bookings")
        .add_header(req_name, req_value.clone())
        .json(&body)
        .await;
    response.assert_status(StatusCode::CREATED);
    let booking: BookingResponse = response.json();
    assert_eq!(booking.status, BookingStatus::Pending);

    let steps = [
        (BookingStatus::Accepted, &provider, "Job Accepted"),
        (BookingStatus::InProgress, &provider, "Job Started"),
        (BookingStatus::PendingConfirmation, &provider, "Job Awaiting Confirmation"),
        (BookingStatus::Completed, &provider, "Job Completed"),
    ];
    for (status, actor, _) in steps {
        let (name, value) = actor_header(actor);
        let updated: BookingResponse = server
            .patch(&format!("/api/v1/bookings/{}/status", booking.id))
            .add_header(name, value)
            .json(&json!({ "status": status }))
            .await
            .json();
        assert_eq!(updated.status, status);
    }

    let fetched: BookingResponse = server
        .get(&format!("/api/v1/bookings/{}", booking.id))
        .add_header(req_name, req_value.clone())
        .await
        .json();
    assert!(fetched.accepted_at.is_some());
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_some());
    assert!(fetched.cancelled_at.is_none());

    // The requester hears about every provider-driven change, newest first.
    let inbox: Vec<Notification> = server
        .get("/api/v1/notifications")
        .add_header(req_name, req_value.clone())
        .await
        .json();
    let titles: Vec<&str> = inbox.iter().map(|n| n.title.as_str()).collect();
    let mut expected: Vec<&str> = steps.iter().map(|(_, _, title)| *title).collect();
    expected.reverse();
    assert_eq!(titles, expected);
    assert!(inbox.iter().all(|n| n.sender_id == Some(provider.id)));

    // The provider only has the creation notice.
    let provider_inbox: Vec<Notification> = server
        .get("/api/v1/notifications")
        .add_header(prov_name, prov_value.clone())
        .await
        .json();
    assert_eq!(provider_inbox.len(), 1);
    assert_eq!(provider_inbox[0].title, "New Booking Request");

    let quota: QuotaResponse = server
        .get(&format!("/api/v1/providers/{}/quota", provider.id))
        .add_header(prov_name, prov_value)
        .await
        .json();
    assert_eq!(quota.accepted_jobs, 1);

    // Completed is terminal.
    let response = server
        .patch(&format!("/api/v1/bookings/{}/status", booking.id))
        .add_header(req_name, req_value)
        .json(&json!({ "status": "cancelled" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let error: Value = response.json();
    assert_eq!(error["code"], "invalid_transition");
    assert!(error["message"].as_str().unwrap().contains("none (terminal)"));

    bg.shutdown().await;
}
