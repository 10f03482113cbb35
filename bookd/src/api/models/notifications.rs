//! API request and response models for notification endpoints.
//!
//! Notification records are returned as-is: the JSON shape served here is the same
//! one pushed over the live stream.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::notifications::NotificationFilter;
use crate::errors::{Error, Result};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationListQuery {
    /// Only return unread notifications
    #[serde(default)]
    pub unread_only: bool,
    /// Maximum number of notifications to return (default 50, at most 200)
    pub limit: Option<i64>,
}

impl NotificationListQuery {
    pub fn into_filter(self) -> Result<NotificationFilter> {
        let limit = self.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(Error::Validation {
                message: format!("limit must be between 1 and {MAX_LIST_LIMIT}"),
            });
        }
        Ok(NotificationFilter {
            unread_only: self.unread_only,
            limit: Some(limit),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    /// Number of notifications that changed from unread to read
    pub updated: u64,
}
