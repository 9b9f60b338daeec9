// In-memory subscription store: HashMaps behind a single `tokio::sync::RwLock`.
//
// Every mutation takes the write lock for its whole read-modify-write, which
// makes each store call atomic with respect to every other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::trace;

use serena_core::db::store::StoreResult;
use serena_core::period::is_stale;
use serena_core::{
    CountableFeature, SubscriptionPatch, SubscriptionRecord, SubscriptionStore, WebhookEventEntry,
};

#[derive(Debug, Default)]
struct Tables {
    subscriptions: HashMap<String, SubscriptionRecord>,
    webhook_events: HashMap<String, WebhookEventEntry>,
}

/// In-memory subscription store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = SubscriptionRecord>) -> Self {
        let subscriptions = records
            .into_iter()
            .map(|r| (r.user_id.clone(), r))
            .collect();
        Self {
            tables: Arc::new(RwLock::new(Tables {
                subscriptions,
                webhook_events: HashMap::new(),
            })),
        }
    }

    /// Insert or replace a record verbatim. Test seeding only.
    pub async fn put(&self, record: SubscriptionRecord) {
        self.tables
            .write()
            .await
            .subscriptions
            .insert(record.user_id.clone(), record);
    }

    pub async fn subscription_count(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }

    pub async fn webhook_event_count(&self) -> usize {
        self.tables.read().await.webhook_events.len()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.subscriptions.clear();
        tables.webhook_events.clear();
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        Ok(self.tables.read().await.subscriptions.get(user_id).cloned())
    }

    async fn find_by_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .values()
            .find(|r| r.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
            .cloned())
    }

    async fn get_or_create(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<SubscriptionRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .subscriptions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                trace!(user_id, "creating free subscription record");
                SubscriptionRecord::new_free(user_id, now)
            });
        Ok(record.clone())
    }

    async fn update(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let mut tables = self.tables.write().await;
        Ok(tables.subscriptions.get_mut(user_id).map(|record| {
            patch.apply_to(record);
            record.clone()
        }))
    }

    async fn update_unless_newer(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
        event_at: DateTime<Utc>,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.subscriptions.get_mut(user_id) else {
            return Ok(None);
        };
        if record.last_webhook_event_date.is_some_and(|last| last > event_at) {
            return Ok(None);
        }
        patch.apply_to(record);
        Ok(Some(record.clone()))
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        counter: CountableFeature,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.subscriptions.get_mut(user_id) else {
            return Ok(None);
        };

        if is_stale(record.last_reset_date, today) {
            record.monthly_recipe_count = 0;
            record.monthly_audio_count = 0;
            record.last_reset_date = today;
        }

        let slot = match counter {
            CountableFeature::Recipe => &mut record.monthly_recipe_count,
            CountableFeature::Audio => &mut record.monthly_audio_count,
        };
        *slot = slot.saturating_add(1);
        let new_count = *slot;
        record.updated_at = now;
        Ok(Some(new_count))
    }

    async fn record_webhook_event(&self, entry: WebhookEventEntry) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.webhook_events.contains_key(&entry.event_id) {
            return Ok(false);
        }
        tables.webhook_events.insert(entry.event_id.clone(), entry);
        Ok(true)
    }

    async fn find_webhook_event(&self, event_id: &str) -> StoreResult<Option<WebhookEventEntry>> {
        Ok(self.tables.read().await.webhook_events.get(event_id).cloned())
    }
}
