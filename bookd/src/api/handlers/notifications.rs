//! HTTP handlers for the notification read surface and the live stream.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::{info, instrument, warn};

use crate::{
    AppState,
    api::models::notifications::{MarkAllReadResponse, NotificationListQuery, UnreadCountResponse},
    auth::CurrentActor,
    db::models::notifications::Notification,
    errors::{Error, Result},
    types::{NotificationId, abbrev_uuid},
};

fn notification_not_found(id: NotificationId) -> Error {
    Error::NotFound {
        resource: "Notification".to_string(),
        id: id.to_string(),
    }
}

/// List the caller's unexpired notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    summary = "List notifications",
    params(NotificationListQuery),
    responses(
        (status = 200, description = "Notifications", body = [Notification]),
        (status = 400, description = "Invalid limit", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationListQuery>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<Notification>>> {
    let filter = query.into_filter()?;
    let notifications = state.stores.notifications.list_for_recipient(actor.id, &filter).await?;
    Ok(Json(notifications))
}

#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    tag = "notifications",
    summary = "Count unread notifications",
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn unread_count(State(state): State<AppState>, CurrentActor(actor): CurrentActor) -> Result<Json<UnreadCountResponse>> {
    let count = state.stores.notifications.unread_count(actor.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    tag = "notifications",
    summary = "Mark notification read",
    params(("id" = uuid::Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification after update", body = Notification),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 404, description = "No such notification for this recipient", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Notification>> {
    // Another recipient's notification is indistinguishable from a missing one.
    let notification = state
        .stores
        .notifications
        .mark_read(id, actor.id)
        .await?
        .ok_or_else(|| notification_not_found(id))?;
    Ok(Json(notification))
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    summary = "Mark all notifications read",
    responses(
        (status = 200, description = "Number of notifications marked read", body = MarkAllReadResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<MarkAllReadResponse>> {
    let updated = state.stores.notifications.mark_all_read(actor.id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "notifications",
    summary = "Delete notification",
    params(("id" = uuid::Uuid, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
        (status = 404, description = "No such notification for this recipient", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    CurrentActor(actor): CurrentActor,
) -> Result<StatusCode> {
    if !state.stores.notifications.delete(id, actor.id).await? {
        return Err(notification_not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Live notification channel.
///
/// The caller is registered for as long as the response stream is alive; each
/// persisted notification addressed to them arrives as a `notification` event.
/// Anything missed while disconnected is still available from the list endpoint.
#[utoipa::path(
    get,
    path = "/notifications/stream",
    tag = "notifications",
    summary = "Stream notifications",
    responses(
        (status = 200, description = "Server-sent events, one `notification` event per record", content_type = "text/event-stream", body = Notification),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorBody),
    ),
    security(("ActorHeader" = []))
)]
#[instrument(skip_all)]
pub async fn stream_notifications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (guard, receiver) = state.registry.register(actor.id);
    info!(
        actor_id = %abbrev_uuid(&actor.id),
        connection_id = %abbrev_uuid(&guard.connection_id()),
        "Notification stream opened"
    );

    let stream = ReceiverStream::new(receiver).map(move |notification| {
        // The guard unregisters the channel when the client goes away and the stream is dropped.
        let _registration = &guard;
        let event = Event::default().event("notification").id(notification.id.to_string());
        Ok(event.json_data(&notification).unwrap_or_else(|e| {
            warn!(notification_id = %abbrev_uuid(&notification.id), error = %e, "Failed to encode notification event");
            Event::default().comment("unencodable notification")
        }))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
