//! Billing types: entitlement decisions, usage outcomes, snapshots,
//! checkout/portal/cancel results and webhook acknowledgements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serena_core::{
    CountableFeature, Quota, ReasonCode, SubscriptionSource, SubscriptionStatus, Tier,
};

/// Outcome of an entitlement check. A denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<ReasonCode>,
    pub message: Option<String>,
    pub upgrade_tier: Option<Tier>,
    pub current_tier: Tier,
}

impl Decision {
    pub fn allow(current_tier: Tier) -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
            upgrade_tier: None,
            current_tier,
        }
    }

    pub fn deny(
        reason: ReasonCode,
        message: impl Into<String>,
        upgrade_tier: Option<Tier>,
        current_tier: Tier,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: Some(message.into()),
            upgrade_tier,
            current_tier,
        }
    }
}

/// Result of a usage increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageIncrement {
    pub success: bool,
    #[serde(rename = "type")]
    pub usage_type: CountableFeature,
    pub new_count: u32,
}

/// Outcome of a metered action run under an entitlement guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Metered<T> {
    /// The check failed; the action was not run.
    Denied(Decision),
    /// The action ran and succeeded. `new_count` is set for countable features.
    Completed { output: T, new_count: Option<u32> },
}

impl<T> Metered<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Metered::Completed { .. })
    }
}

/// Per-feature limits and usage inside a [`SubscriptionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub recipes_per_month: Quota,
    pub recipes_used: u32,
    pub recipes_remaining: i64,
    pub audio_generation_per_month: Quota,
    pub audio_used: u32,
    pub audio_remaining: i64,
    pub has_ai_coach: bool,
    pub has_community_access: bool,
    pub has_advanced_stats: bool,
    pub has_breathing_full: bool,
    pub has_audio_library: bool,
}

/// Full entitlement snapshot for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub source: Option<SubscriptionSource>,
    pub features: FeatureSnapshot,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
}

/// Checkout request from a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

/// Hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Hosted billing-portal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// Result of an end-of-period cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub success: bool,
    pub message: String,
    pub end_date: Option<DateTime<Utc>>,
}

/// Body returned for every webhook delivery that is acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    fn received() -> Self {
        Self {
            received: true,
            ..Default::default()
        }
    }

    pub fn applied() -> Self {
        Self {
            success: Some(true),
            ..Self::received()
        }
    }

    pub fn duplicate() -> Self {
        Self {
            duplicate: Some(true),
            ..Self::received()
        }
    }

    pub fn ignored() -> Self {
        Self {
            ignored: Some(true),
            ..Self::received()
        }
    }

    pub fn stale() -> Self {
        Self {
            stale: Some(true),
            ..Self::received()
        }
    }

    pub fn error(tag: impl Into<String>) -> Self {
        Self {
            error: Some(tag.into()),
            ..Self::received()
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate == Some(true)
    }
}
