//! Test utilities for HTTP-level tests over the in-memory backend.
use axum_test::TestServer;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    Application, BackgroundServices,
    config::{Config, QuotaConfig},
    db::{
        Stores,
        models::actors::{Actor, ProviderQuota, Role, SubscriptionTier},
    },
    types::UserId,
};

pub const ACTOR_HEADER: &str = "x-bookd-actor";

/// Defaults, minus the things that make tests slow: no sweeper, immediate retries.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.notifications.sweep_enabled = false;
    config.notifications.retry_schedule_secs = vec![0];
    config
}

pub fn create_test_app() -> (TestServer, Stores, BackgroundServices) {
    create_test_app_with_config(create_test_config())
}

pub fn create_test_app_with_config(config: Config) -> (TestServer, Stores, BackgroundServices) {
    let app = Application::with_stores(config, Stores::in_memory(), None);
    let stores = app.stores().clone();
    let (server, bg_services) = app.into_test_server();
    (server, stores, bg_services)
}

/// Register an actor in the directory. Providers start a fresh free-tier period.
pub async fn create_test_actor(stores: &Stores, role: Role, verified: bool) -> Actor {
    let actor = Actor {
        id: Uuid::new_v4(),
        role,
        display_name: Some(format!("test {}", role.as_str())),
        quota: (role == Role::Provider).then(|| ProviderQuota::for_tier(SubscriptionTier::Free, &QuotaConfig::default())),
    };
    stores.actors.upsert_actor(&actor).await.expect("Failed to create test actor");
    stores
        .verification
        .set_approved(actor.id, verified)
        .await
        .expect("Failed to set verification");
    actor
}

pub fn actor_header(actor: &Actor) -> (&'static str, String) {
    (ACTOR_HEADER, actor.id.to_string())
}

pub fn booking_body(provider_id: UserId) -> Value {
    json!({
        "provider_id": provider_id,
        "service_name": "Boiler service",
        "scheduled_date": "2026-11-02",
        "scheduled_time": "09:30:00",
        "description": "Annual boiler check",
        "contact": "+44 7700 900123",
        "hourly_rate": "45.00",
        "estimated_duration_hours": "2",
        "total_amount": "90.00"
    })
}
