//! API request and response models for provider endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::actors::{ProviderQuota, SubscriptionTier};
use crate::types::UserId;

/// Start a new subscription period, optionally on a different tier.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubscriptionUpdate {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuotaResponse {
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: UserId,
    pub subscription_tier: SubscriptionTier,
    pub accepted_jobs: i32,
    pub max_jobs: i32,
    pub remaining: i32,
}

impl QuotaResponse {
    pub fn new(provider_id: UserId, quota: ProviderQuota) -> Self {
        Self {
            provider_id,
            subscription_tier: quota.subscription_tier,
            accepted_jobs: quota.accepted_jobs,
            max_jobs: quota.max_jobs,
            remaining: quota.remaining(),
        }
    }
}
