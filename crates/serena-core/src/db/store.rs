// Subscription store trait: the seam every storage backend implements.
//
// The store is the single source of truth for usage counters. Anything that
// mutates a record must go through one call here so the backend can apply it
// as one atomic, row-level update; callers never read-modify-write across two
// round trips.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::db::models::{
    SubscriptionRecord, SubscriptionSource, SubscriptionStatus, WebhookEventEntry,
};
use crate::error::SerenaError;
use crate::policy::{CountableFeature, Tier};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, SerenaError>;

/// Partial update of a subscription record.
///
/// `None` leaves a column untouched. Nullable columns take
/// `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    pub tier: Option<Tier>,
    pub status: Option<SubscriptionStatus>,
    pub subscription_source: Option<Option<SubscriptionSource>>,
    pub stripe_customer_id: Option<Option<String>>,
    pub stripe_subscription_id: Option<Option<String>>,
    pub subscription_start_date: Option<Option<DateTime<Utc>>>,
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
    pub last_webhook_event: Option<Option<String>>,
    pub last_webhook_event_date: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionPatch {
    /// Empty patch stamped with an `updated_at`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(now),
            ..Default::default()
        }
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn status(mut self, status: SubscriptionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn source(mut self, source: Option<SubscriptionSource>) -> Self {
        self.subscription_source = Some(source);
        self
    }

    pub fn customer_id(mut self, id: Option<String>) -> Self {
        self.stripe_customer_id = Some(id);
        self
    }

    pub fn subscription_id(mut self, id: Option<String>) -> Self {
        self.stripe_subscription_id = Some(id);
        self
    }

    pub fn start_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.subscription_start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.subscription_end_date = Some(date);
        self
    }

    pub fn webhook_event(mut self, event_type: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.last_webhook_event = Some(Some(event_type.into()));
        self.last_webhook_event_date = Some(Some(at));
        self
    }

    /// Whether the patch changes any domain column (`updated_at` aside).
    pub fn is_empty(&self) -> bool {
        self.tier.is_none()
            && self.status.is_none()
            && self.subscription_source.is_none()
            && self.stripe_customer_id.is_none()
            && self.stripe_subscription_id.is_none()
            && self.subscription_start_date.is_none()
            && self.subscription_end_date.is_none()
            && self.last_webhook_event.is_none()
            && self.last_webhook_event_date.is_none()
    }

    /// Apply in place. Used by backends that hold records in memory.
    pub fn apply_to(&self, record: &mut SubscriptionRecord) {
        if let Some(tier) = self.tier {
            record.tier = tier;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(source) = self.subscription_source {
            record.subscription_source = source;
        }
        if let Some(ref id) = self.stripe_customer_id {
            record.stripe_customer_id = id.clone();
        }
        if let Some(ref id) = self.stripe_subscription_id {
            record.stripe_subscription_id = id.clone();
        }
        if let Some(date) = self.subscription_start_date {
            record.subscription_start_date = date;
        }
        if let Some(date) = self.subscription_end_date {
            record.subscription_end_date = date;
        }
        if let Some(ref event) = self.last_webhook_event {
            record.last_webhook_event = event.clone();
        }
        if let Some(date) = self.last_webhook_event_date {
            record.last_webhook_event_date = date;
        }
        if let Some(at) = self.updated_at {
            record.updated_at = at;
        }
    }
}

/// Persistent subscription storage.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + fmt::Debug {
    /// Load the record for a user.
    async fn find(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>>;

    /// Load the record carrying a billing-provider subscription id.
    async fn find_by_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Return the user's record, inserting a FREE/active one if none exists.
    /// Insert-if-absent must be atomic: two concurrent calls yield one record.
    async fn get_or_create(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<SubscriptionRecord>;

    /// Apply a patch in one statement. `None` when the user has no record.
    async fn update(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Apply a patch unless the record already carries a webhook event dated
    /// after `event_at`. The date test and the write are one statement.
    /// `None` when the user has no record or the stored event is newer.
    async fn update_unless_newer(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
        event_at: DateTime<Utc>,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Apply a patch, creating the record first if needed.
    async fn upsert(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<SubscriptionRecord> {
        self.get_or_create(user_id, now).await?;
        self.update(user_id, patch).await?.ok_or_else(|| {
            SerenaError::Store(format!("record for user {user_id} vanished during upsert"))
        })
    }

    /// Atomically reset stale counters and add one to `counter`.
    ///
    /// If `last_reset_date` is in an earlier month than `today`, both
    /// counters become zero and `last_reset_date` becomes `today` before the
    /// increment, all in the same update. Returns the new count, or `None`
    /// when the user has no record.
    async fn increment_usage(
        &self,
        user_id: &str,
        counter: CountableFeature,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<u32>>;

    /// Insert into the webhook event log unless the id is already present.
    /// Returns `true` on first insert, `false` for a duplicate.
    async fn record_webhook_event(&self, entry: WebhookEventEntry) -> StoreResult<bool>;

    async fn find_webhook_event(&self, event_id: &str) -> StoreResult<Option<WebhookEventEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn patch_applies_only_set_fields() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let mut rec = SubscriptionRecord::new_free("u1", now);
        rec.stripe_customer_id = Some("cus_1".into());

        let later = now + chrono::Duration::hours(1);
        SubscriptionPatch::at(later)
            .tier(Tier::Basic)
            .end_date(None)
            .apply_to(&mut rec);

        assert_eq!(rec.tier, Tier::Basic);
        assert_eq!(rec.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(rec.updated_at, later);
    }

    #[test]
    fn patch_can_clear_nullable_columns() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let mut rec = SubscriptionRecord::new_free("u1", now);
        rec.subscription_end_date = Some(now);
        SubscriptionPatch::default().end_date(None).apply_to(&mut rec);
        assert!(rec.subscription_end_date.is_none());
    }

    #[test]
    fn empty_patch_ignores_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        assert!(SubscriptionPatch::at(now).is_empty());
        assert!(!SubscriptionPatch::at(now).status(SubscriptionStatus::Expired).is_empty());
    }
}
