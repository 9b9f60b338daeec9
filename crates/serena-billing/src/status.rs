//! Subscription status snapshot.

use chrono::NaiveDate;
use serena_core::error::Result;
use serena_core::{CountableFeature, Principal, SubscriptionRecord};
use tracing::debug;

use crate::types::{FeatureSnapshot, SubscriptionSnapshot};
use crate::BillingService;

/// Build the snapshot for a record as seen on `today`.
pub fn snapshot_of(record: &SubscriptionRecord, today: NaiveDate) -> SubscriptionSnapshot {
    let limits = record.tier.limits();
    let recipes_used = record.effective_count(CountableFeature::Recipe, today);
    let audio_used = record.effective_count(CountableFeature::Audio, today);

    SubscriptionSnapshot {
        tier: record.tier,
        status: record.status,
        source: record.subscription_source,
        features: FeatureSnapshot {
            recipes_per_month: limits.recipes_per_month,
            recipes_used,
            recipes_remaining: limits.recipes_per_month.remaining(recipes_used),
            audio_generation_per_month: limits.audio_per_month,
            audio_used,
            audio_remaining: limits.audio_per_month.remaining(audio_used),
            has_ai_coach: limits.has_ai_coach,
            has_community_access: limits.has_community_access,
            has_advanced_stats: limits.has_advanced_stats,
            has_breathing_full: limits.has_breathing_full,
            has_audio_library: limits.has_audio_library,
        },
        subscription_start_date: record.subscription_start_date,
        subscription_end_date: record.subscription_end_date,
    }
}

impl BillingService {
    /// Full entitlement snapshot, creating a FREE record on first call.
    pub async fn snapshot(&self, principal: &Principal) -> Result<SubscriptionSnapshot> {
        let now = self.clock.now();
        let record = self.store.get_or_create(&principal.user_id, now).await?;
        let snapshot = snapshot_of(&record, now.date_naive());
        debug!(
            user_id = %principal.user_id,
            tier = %snapshot.tier,
            status = %snapshot.status,
            "subscription snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serena_core::{Quota, Tier};

    #[test]
    fn remaining_counts_follow_limits() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        let mut rec = SubscriptionRecord::new_free("u1", now);
        rec.tier = Tier::Basic;
        rec.monthly_recipe_count = 12;
        rec.monthly_audio_count = 11;

        let snap = snapshot_of(&rec, now.date_naive());
        assert_eq!(snap.features.recipes_per_month, Quota::Monthly(50));
        assert_eq!(snap.features.recipes_remaining, 38);
        assert_eq!(snap.features.audio_remaining, 0);
        assert!(snap.features.has_breathing_full);
    }

    #[test]
    fn unlimited_reports_minus_one() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        let mut rec = SubscriptionRecord::new_free("u1", now);
        rec.tier = Tier::Premium;
        rec.monthly_recipe_count = 400;

        let snap = snapshot_of(&rec, now.date_naive());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["features"]["recipes_per_month"], -1);
        assert_eq!(json["features"]["recipes_remaining"], -1);
        assert_eq!(json["features"]["recipes_used"], 400);
    }

    #[test]
    fn stale_usage_reads_as_zero() {
        let then = Utc.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap();
        let mut rec = SubscriptionRecord::new_free("u1", then);
        rec.monthly_recipe_count = 5;

        let today = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap().date_naive();
        let snap = snapshot_of(&rec, today);
        assert_eq!(snap.features.recipes_used, 0);
        assert_eq!(snap.features.recipes_remaining, 5);
    }
}
