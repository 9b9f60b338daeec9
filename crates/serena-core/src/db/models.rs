// Subscription record and webhook log models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{CountableFeature, Tier};

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trial => "trial",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trial" => Ok(Self::Trial),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Who bills the subscription: the web billing provider or a mobile app store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionSource {
    Web,
    Mobile,
}

impl SubscriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
        }
    }
}

impl FromStr for SubscriptionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown subscription source: {other}")),
        }
    }
}

/// One record per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub monthly_recipe_count: u32,
    pub monthly_audio_count: u32,
    pub last_reset_date: NaiveDate,
    pub subscription_source: Option<SubscriptionSource>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub last_webhook_event: Option<String>,
    pub last_webhook_event_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// A fresh FREE/active record with zero usage, reset as of `now`.
    pub fn new_free(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            monthly_recipe_count: 0,
            monthly_audio_count: 0,
            last_reset_date: now.date_naive(),
            subscription_source: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_start_date: None,
            subscription_end_date: None,
            last_webhook_event: None,
            last_webhook_event_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raw stored counter, without staleness applied.
    pub fn count(&self, counter: CountableFeature) -> u32 {
        match counter {
            CountableFeature::Recipe => self.monthly_recipe_count,
            CountableFeature::Audio => self.monthly_audio_count,
        }
    }

    /// Counter value as seen on `today`.
    pub fn effective_count(&self, counter: CountableFeature, today: NaiveDate) -> u32 {
        crate::period::effective_count(self.count(counter), self.last_reset_date, today)
    }

    /// Whether the status permits any entitlement at `now`.
    ///
    /// `cancelled` keeps access while the paid period runs, i.e. while
    /// `subscription_end_date` lies in the future.
    pub fn passes_status_gate(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trial => true,
            SubscriptionStatus::Cancelled => {
                self.subscription_end_date.is_some_and(|end| end > now)
            }
            SubscriptionStatus::Expired => false,
        }
    }

    pub fn is_web_managed(&self) -> bool {
        self.subscription_source == Some(SubscriptionSource::Web)
    }
}

/// Append-only log entry for a received billing event. `event_id` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventEntry {
    pub event_id: String,
    pub event_type: String,
    pub source: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
