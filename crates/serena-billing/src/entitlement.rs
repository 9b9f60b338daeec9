//! Entitlement evaluation.
//!
//! A pure read over the subscription record and the tier policy table. Stale
//! counters are read as zero here; the reset itself is only ever written by
//! the usage incrementer.

use chrono::{DateTime, Utc};
use serena_core::{
    Allowance, Feature, Principal, ReasonCode, SubscriptionRecord, Tier,
};
use tracing::debug;

use crate::types::Decision;
use crate::BillingService;

const INACTIVE_MESSAGE: &str = "Your subscription is not active";
const NOT_AUTHENTICATED_MESSAGE: &str = "You must be signed in to use this feature";
const UNKNOWN_FEATURE_MESSAGE: &str = "Unknown feature";

/// Decide whether `feature` is available given the user's record at `now`.
///
/// A missing record is an implicit FREE/active record with zero usage.
pub fn decide(record: Option<&SubscriptionRecord>, feature: Feature, now: DateTime<Utc>) -> Decision {
    let tier = record.map(|r| r.tier).unwrap_or_default();

    if let Some(record) = record {
        if !record.passes_status_gate(now) {
            return Decision::deny(
                ReasonCode::SubscriptionInactive,
                INACTIVE_MESSAGE,
                Some(tier.max(Tier::Basic)),
                tier,
            );
        }
    }

    let used = match (feature.countable(), record) {
        (Some(counter), Some(record)) => record.effective_count(counter, now.date_naive()),
        _ => 0,
    };

    let allowance = tier.limits().allowance(feature);
    if allowance.admits(used) {
        return Decision::allow(tier);
    }

    let reason = match allowance {
        Allowance::Metered(quota) if quota.is_offered() => ReasonCode::LimitReached,
        Allowance::Metered(_) | Allowance::Capability(_) => ReasonCode::TierRequired,
    };

    Decision::deny(
        reason,
        denial_message(tier, feature),
        upgrade_for(tier, feature, used),
        tier,
    )
}

/// Lowest tier above `current` that would admit the feature at `used`.
pub fn upgrade_for(current: Tier, feature: Feature, used: u32) -> Option<Tier> {
    current
        .above()
        .find(|tier| tier.limits().allowance(feature).admits(used))
}

/// User-facing copy for a denial at `tier`.
///
/// Every (tier, feature) pair is spelled out so adding a feature or tier
/// fails to compile until it has copy.
pub fn denial_message(tier: Tier, feature: Feature) -> &'static str {
    use Feature::*;

    match (tier, feature) {
        (Tier::Free, GenerateRecipe) => {
            "You have reached your limit of 5 recipes this month. Upgrade to Basic for 50 recipes per month."
        }
        (Tier::Free, GenerateAudio) => {
            "Audio generation is not available on the free plan. Upgrade to Basic to unlock it."
        }
        (Tier::Basic, GenerateRecipe) => {
            "You have reached your limit of 50 recipes this month. Upgrade to Premium for unlimited recipes."
        }
        (Tier::Basic, GenerateAudio) => {
            "You have reached your limit of 10 audio sessions this month. Upgrade to Premium for unlimited audio."
        }
        (Tier::Free | Tier::Basic, AiCoach) => "The AI coach is available on the Premium plan only.",
        (Tier::Free | Tier::Basic, Community) => {
            "Community access is available on the Premium plan only."
        }
        (Tier::Free | Tier::Basic, AdvancedStats) => {
            "Advanced statistics are available on the Premium plan only."
        }
        (Tier::Free, BreathingFull) => "Full breathing sessions are available from the Basic plan.",
        (Tier::Free, AudioLibrary) => "The audio library is available from the Basic plan.",
        (Tier::Basic, BreathingFull | AudioLibrary)
        | (
            Tier::Premium,
            GenerateRecipe | GenerateAudio | AiCoach | Community | AdvancedStats | BreathingFull
            | AudioLibrary,
        ) => "This feature is included in your plan.",
    }
}

impl BillingService {
    /// Evaluate a raw feature identifier for an optional principal.
    ///
    /// Unauthenticated callers are denied without touching the store. An
    /// unknown feature identifier is denied with the caller's stored tier.
    pub async fn evaluate(
        &self,
        principal: Option<&Principal>,
        feature: &str,
    ) -> serena_core::error::Result<Decision> {
        let Some(principal) = principal else {
            return Ok(Decision::deny(
                ReasonCode::NotAuthenticated,
                NOT_AUTHENTICATED_MESSAGE,
                None,
                Tier::Free,
            ));
        };

        let Ok(feature) = feature.parse::<Feature>() else {
            debug!(user_id = %principal.user_id, feature, "unknown feature requested");
            let current_tier = self
                .store
                .find(&principal.user_id)
                .await?
                .map_or(Tier::Free, |record| record.tier);
            return Ok(Decision::deny(
                ReasonCode::UnknownFeature,
                UNKNOWN_FEATURE_MESSAGE,
                None,
                current_tier,
            ));
        };

        self.check(principal, feature).await
    }

    /// Evaluate a known feature for an authenticated principal.
    pub async fn check(
        &self,
        principal: &Principal,
        feature: Feature,
    ) -> serena_core::error::Result<Decision> {
        let record = self.store.find(&principal.user_id).await?;
        let decision = decide(record.as_ref(), feature, self.clock.now());

        debug!(
            user_id = %principal.user_id,
            feature = %feature,
            allowed = decision.allowed,
            reason = ?decision.reason,
            "entitlement evaluated"
        );
        Ok(decision)
    }
}
