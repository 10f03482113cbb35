//! Provider admission control.
//!
//! [`QuotaLedger`] turns [`QuotaStore`] outcomes into application errors and metrics.
//! The conditional increment itself lives in the store so that it is one atomic step
//! in every backend; nothing here reads the counter and then writes it.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::config::QuotaConfig;
use crate::db::handlers::{QuotaStore, ReserveOutcome};
use crate::db::models::actors::{ProviderQuota, SubscriptionTier};
use crate::errors::{Error, Result};
use crate::types::{UserId, abbrev_uuid};

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn QuotaStore>,
    limits: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn QuotaStore>, limits: QuotaConfig) -> Self {
        Self { store, limits }
    }

    /// Take one acceptance slot for the provider, or fail with `QuotaExceeded`.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id)), err)]
    pub async fn reserve(&self, provider_id: UserId) -> Result<ProviderQuota> {
        match self.store.reserve(provider_id).await? {
            ReserveOutcome::Reserved(quota) => {
                counter!("bookd_quota_reservations_total", "outcome" => "reserved").increment(1);
                debug!(accepted_jobs = quota.accepted_jobs, max_jobs = quota.max_jobs, "Reserved acceptance slot");
                Ok(quota)
            }
            ReserveOutcome::Exhausted(quota) => {
                counter!("bookd_quota_reservations_total", "outcome" => "exhausted").increment(1);
                Err(Error::QuotaExceeded {
                    provider_id,
                    max_jobs: quota.max_jobs,
                })
            }
            ReserveOutcome::UnknownProvider => {
                counter!("bookd_quota_reservations_total", "outcome" => "unknown_provider").increment(1);
                Err(Error::NotFound {
                    resource: "Provider".to_string(),
                    id: provider_id.to_string(),
                })
            }
        }
    }

    /// Give back a slot taken by [`reserve`](Self::reserve) whose transition did not persist.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id)), err)]
    pub async fn release(&self, provider_id: UserId) -> Result<ProviderQuota> {
        let quota = self.store.release(provider_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: provider_id.to_string(),
        })?;
        counter!("bookd_quota_releases_total").increment(1);
        Ok(quota)
    }

    /// Start a new subscription period on `tier`: the counter goes back to zero and the
    /// ceiling follows the tier.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&provider_id), tier = tier.as_str()), err)]
    pub async fn renew(&self, provider_id: UserId, tier: SubscriptionTier) -> Result<ProviderQuota> {
        let max_jobs = tier.max_jobs(&self.limits);
        match self.store.reset_for_tier(provider_id, tier, max_jobs).await? {
            Some(quota) => Ok(quota),
            None => {
                warn!("Subscription renewal for an actor that is not a provider");
                Err(Error::NotFound {
                    resource: "Provider".to_string(),
                    id: provider_id.to_string(),
                })
            }
        }
    }

    pub async fn quota(&self, provider_id: UserId) -> Result<ProviderQuota> {
        self.store.quota(provider_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: provider_id.to_string(),
        })
    }
}
