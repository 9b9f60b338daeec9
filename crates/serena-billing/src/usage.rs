//! Usage metering.
//!
//! Counters only move through `SubscriptionStore::increment_usage`, which
//! folds the monthly reset and the increment into one atomic update.

use std::future::Future;

use serena_core::error::Result;
use serena_core::{ApiError, CountableFeature, Feature, Principal, SerenaError};
use tracing::{debug, info};

use crate::types::{Metered, UsageIncrement};
use crate::BillingService;

impl BillingService {
    /// Record one successful use of a countable feature.
    ///
    /// Call only after the action itself succeeded. A user without a record
    /// is an error: nothing is created with a pre-incremented counter.
    pub async fn increment(
        &self,
        user_id: &str,
        counter: CountableFeature,
    ) -> Result<UsageIncrement> {
        let now = self.clock.now();
        let new_count = self
            .store
            .increment_usage(user_id, counter, now.date_naive(), now)
            .await?
            .ok_or_else(|| ApiError::not_found("Subscription not found"))?;

        info!(user_id, usage_type = %counter, new_count, "usage incremented");
        Ok(UsageIncrement {
            success: true,
            usage_type: counter,
            new_count,
        })
    }

    /// Check, run, then meter.
    ///
    /// `action` runs only when the check allows the feature, and the counter
    /// moves only when `action` returns `Ok`. A failed action consumes
    /// nothing.
    pub async fn run_metered<F, Fut, T, E>(
        &self,
        principal: &Principal,
        feature: Feature,
        action: F,
    ) -> std::result::Result<Metered<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<SerenaError>,
    {
        // The incrementer refuses users without a record.
        self.store
            .get_or_create(&principal.user_id, self.clock.now())
            .await?;

        let decision = self.check(principal, feature).await?;
        if !decision.allowed {
            debug!(user_id = %principal.user_id, feature = %feature, "metered action denied");
            return Ok(Metered::Denied(decision));
        }

        let output = action().await?;

        let new_count = match feature.countable() {
            Some(counter) => Some(self.increment(&principal.user_id, counter).await?.new_count),
            None => None,
        };

        Ok(Metered::Completed { output, new_count })
    }
}
