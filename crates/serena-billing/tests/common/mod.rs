#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serena_billing::{BillingProvider, BillingService};
use serena_core::{BillingOptions, Clock, EventOrdering, Principal, SubscriptionRecord, SubscriptionStore};
use serena_memory::MemoryStore;
use serena_test_utils::fixtures::WEBHOOK_SECRET;
use serena_test_utils::{FixedClock, MockBillingProvider};

pub fn t(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub struct Harness {
    pub service: BillingService,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockBillingProvider>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::build(now, EventOrdering::ArrivalOrder, MockBillingProvider::new())
    }

    pub fn with_ordering(now: DateTime<Utc>, ordering: EventOrdering) -> Self {
        Self::build(now, ordering, MockBillingProvider::new())
    }

    pub fn with_provider(now: DateTime<Utc>, provider: MockBillingProvider) -> Self {
        Self::build(now, EventOrdering::ArrivalOrder, provider)
    }

    fn build(now: DateTime<Utc>, ordering: EventOrdering, provider: MockBillingProvider) -> Self {
        let mut options = BillingOptions::new("sk_test_123", WEBHOOK_SECRET);
        options.event_ordering = ordering;

        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let clock = Arc::new(FixedClock::new(now));

        let service = BillingService::new(
            options,
            Arc::clone(&store) as Arc<dyn SubscriptionStore>,
            Arc::clone(&provider) as Arc<dyn BillingProvider>,
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);

        Self {
            service,
            store,
            provider,
            clock,
        }
    }

    pub async fn seed(&self, record: SubscriptionRecord) {
        self.store.put(record).await;
    }

    pub async fn record(&self, user_id: &str) -> SubscriptionRecord {
        self.store
            .find(user_id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("no record for {user_id}"))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub fn user(id: &str) -> Principal {
    Principal::new(id).with_email(format!("{id}@example.com"))
}
