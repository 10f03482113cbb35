//! OpenAPI document for `/api/v1/*`, served at `/api-docs/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::db::models::{
    actors::SubscriptionTier,
    bookings::{BookingKind, BookingStatus},
    notifications::{Notification, NotificationCategory, NotificationType},
};
use crate::errors::ErrorBody;

/// Documents the trusted identity header set by the fronting proxy.
struct ActorHeaderAddon;

impl Modify for ActorHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ActorHeader".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-bookd-actor",
                    "User ID of the caller, set by the authenticating proxy. The header name is configurable with `auth.actor_header`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "bookd",
        description = "Booking lifecycle, provider quotas and notifications"
    ),
    servers((url = "/api/v1")),
    paths(
        api::handlers::bookings::create_booking,
        api::handlers::bookings::list_bookings,
        api::handlers::bookings::get_booking,
        api::handlers::bookings::update_booking_status,
        api::handlers::bookings::delete_booking,
        api::handlers::notifications::list_notifications,
        api::handlers::notifications::unread_count,
        api::handlers::notifications::mark_notification_read,
        api::handlers::notifications::mark_all_notifications_read,
        api::handlers::notifications::delete_notification,
        api::handlers::notifications::stream_notifications,
        api::handlers::providers::update_subscription,
        api::handlers::providers::get_quota,
    ),
    components(schemas(
        api::models::bookings::BookingCreate,
        api::models::bookings::BookingResponse,
        api::models::bookings::BookingStatusChange,
        api::models::notifications::UnreadCountResponse,
        api::models::notifications::MarkAllReadResponse,
        api::models::providers::SubscriptionUpdate,
        api::models::providers::QuotaResponse,
        BookingStatus,
        BookingKind,
        SubscriptionTier,
        Notification,
        NotificationType,
        NotificationCategory,
        ErrorBody,
    )),
    modifiers(&ActorHeaderAddon),
    tags(
        (name = "bookings", description = "Booking creation and lifecycle"),
        (name = "notifications", description = "Recipient notifications and the live stream"),
        (name = "providers", description = "Provider subscriptions and quotas"),
    )
)]
pub struct ApiDoc;
