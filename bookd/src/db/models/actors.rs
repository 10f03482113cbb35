//! Actor directory records and the provider quota embedded in them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::QuotaConfig;
use crate::types::UserId;

/// Role an actor plays in the booking domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Provider => "provider",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requester" => Ok(Self::Requester),
            "provider" => Ok(Self::Provider),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// Provider subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    /// Ceiling on accepted jobs per subscription period for this tier.
    pub fn max_jobs(&self, limits: &QuotaConfig) -> i32 {
        match self {
            Self::Free => limits.free_max_jobs,
            Self::Premium => limits.premium_max_jobs,
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            _ => Err(format!("Unknown subscription tier: {s}")),
        }
    }
}

/// Per-period acceptance counter of a provider.
///
/// `accepted_jobs` only grows between renewals; completing or cancelling a job
/// does not give the slot back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderQuota {
    pub subscription_tier: SubscriptionTier,
    pub accepted_jobs: i32,
    pub max_jobs: i32,
}

impl ProviderQuota {
    /// A fresh period for the given tier.
    pub fn for_tier(tier: SubscriptionTier, limits: &QuotaConfig) -> Self {
        Self {
            subscription_tier: tier,
            accepted_jobs: 0,
            max_jobs: tier.max_jobs(limits),
        }
    }

    pub fn remaining(&self) -> i32 {
        (self.max_jobs - self.accepted_jobs).max(0)
    }

    pub fn has_capacity(&self) -> bool {
        self.accepted_jobs < self.max_jobs
    }
}

/// Actor directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub display_name: Option<String>,
    /// Present for providers only.
    pub quota: Option<ProviderQuota>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_provider(&self) -> bool {
        self.role == Role::Provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ceilings_follow_config() {
        let limits = QuotaConfig {
            free_max_jobs: 3,
            premium_max_jobs: i32::MAX,
        };
        assert_eq!(SubscriptionTier::Free.max_jobs(&limits), 3);
        assert_eq!(SubscriptionTier::Premium.max_jobs(&limits), i32::MAX);

        let quota = ProviderQuota {
            subscription_tier: SubscriptionTier::Free,
            accepted_jobs: 3,
            max_jobs: 3,
        };
        assert!(!quota.has_capacity());
        assert_eq!(quota.remaining(), 0);
    }
}
