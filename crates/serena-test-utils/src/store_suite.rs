// Store conformance suite.
//
// Every `SubscriptionStore` backend must pass the same cases. Each case runs
// against a fresh store from the factory. A failing case panics with its name
// so it shows up directly in `cargo test` output.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serena_core::{
    CountableFeature, SubscriptionPatch, SubscriptionSource, SubscriptionStatus, SubscriptionStore,
    Tier, WebhookEventEntry,
};

type CaseResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

macro_rules! ensure {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(format!($($msg)+).into());
        }
    };
}

macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        let (l, r) = (&$left, &$right);
        if l != r {
            return Err(format!(
                "{} != {}: {:?} vs {:?}",
                stringify!($left),
                stringify!($right),
                l,
                r
            )
            .into());
        }
    }};
}

fn jan() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).single().unwrap_or_else(Utc::now)
}

fn feb() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 3, 8, 0, 0).single().unwrap_or_else(Utc::now)
}

fn day(dt: DateTime<Utc>) -> NaiveDate {
    dt.date_naive()
}

/// Runs the store contract against stores built by `make`.
pub struct StoreTestSuite<F> {
    make: F,
}

impl<F, Fut, S> StoreTestSuite<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
    S: SubscriptionStore + 'static,
{
    pub fn new(make: F) -> Self {
        Self { make }
    }

    async fn run<C, CFut>(&self, name: &str, case: C)
    where
        C: FnOnce(Arc<S>) -> CFut,
        CFut: Future<Output = CaseResult>,
    {
        let store = Arc::new((self.make)().await);
        match case(store).await {
            Ok(()) => tracing::info!("[store suite] ✓ {name}"),
            Err(e) => panic!("store conformance case `{name}` failed: {e}"),
        }
    }

    /// Run every case. Concurrency cases spawn tasks, so call this from a
    /// multi-threaded runtime.
    pub async fn run_all(&self) {
        self.run("get_or_create_inserts_free_record", get_or_create_inserts_free_record::<S>).await;
        self.run("get_or_create_keeps_existing_record", get_or_create_keeps_existing_record::<S>).await;
        self.run("concurrent_get_or_create_yields_one_record", concurrent_get_or_create_yields_one_record::<S>).await;
        self.run("find_missing_is_none", find_missing_is_none::<S>).await;
        self.run("update_round_trips_every_column", update_round_trips_every_column::<S>).await;
        self.run("update_missing_is_none", update_missing_is_none::<S>).await;
        self.run("update_clears_nullable_columns", update_clears_nullable_columns::<S>).await;
        self.run("upsert_creates_then_patches", upsert_creates_then_patches::<S>).await;
        self.run("update_unless_newer_skips_older_events", update_unless_newer_skips_older_events::<S>).await;
        self.run("concurrent_event_updates_keep_newest", concurrent_event_updates_keep_newest::<S>).await;
        self.run("find_by_subscription_id", find_by_subscription_id::<S>).await;
        self.run("increment_missing_is_none", increment_missing_is_none::<S>).await;
        self.run("increment_within_month", increment_within_month::<S>).await;
        self.run("increment_resets_stale_period", increment_resets_stale_period::<S>).await;
        self.run("increment_never_moves_reset_backwards", increment_never_moves_reset_backwards::<S>).await;
        self.run("concurrent_increments_lose_nothing", concurrent_increments_lose_nothing::<S>).await;
        self.run("webhook_event_recorded_once", webhook_event_recorded_once::<S>).await;
        self.run("concurrent_webhook_insert_single_winner", concurrent_webhook_insert_single_winner::<S>).await;
    }
}

async fn get_or_create_inserts_free_record<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    let rec = store.get_or_create("u1", jan()).await?;
    ensure_eq!(rec.user_id, "u1");
    ensure_eq!(rec.tier, Tier::Free);
    ensure_eq!(rec.status, SubscriptionStatus::Active);
    ensure_eq!(rec.monthly_recipe_count, 0);
    ensure_eq!(rec.monthly_audio_count, 0);
    ensure_eq!(rec.last_reset_date, day(jan()));
    ensure!(rec.subscription_source.is_none(), "source should be null");

    let found = store.find("u1").await?;
    ensure!(found.is_some(), "record not persisted");
    Ok(())
}

async fn get_or_create_keeps_existing_record<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;
    store
        .update("u1", SubscriptionPatch::at(jan()).tier(Tier::Basic))
        .await?;
    store
        .increment_usage("u1", CountableFeature::Recipe, day(jan()), jan())
        .await?;

    let later = jan() + Duration::days(2);
    let rec = store.get_or_create("u1", later).await?;
    ensure_eq!(rec.tier, Tier::Basic);
    ensure_eq!(rec.monthly_recipe_count, 1);
    ensure_eq!(rec.created_at, jan());
    ensure_eq!(rec.last_reset_date, day(jan()));
    Ok(())
}

async fn concurrent_get_or_create_yields_one_record<S: SubscriptionStore + 'static>(
    store: Arc<S>,
) -> CaseResult {
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .get_or_create("racer", jan() + Duration::seconds(i))
                .await
        }));
    }
    let mut created = Vec::new();
    for handle in handles {
        created.push(handle.await??.created_at);
    }
    ensure!(
        created.windows(2).all(|w| w[0] == w[1]),
        "concurrent creators observed different records: {created:?}"
    );

    let n = store
        .increment_usage("racer", CountableFeature::Recipe, day(jan()), jan())
        .await?;
    ensure_eq!(n, Some(1));
    Ok(())
}

async fn find_missing_is_none<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    ensure!(store.find("nobody").await?.is_none(), "found a ghost record");
    ensure!(
        store.find_by_subscription_id("sub_nobody").await?.is_none(),
        "found a ghost subscription"
    );
    Ok(())
}

async fn update_round_trips_every_column<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;

    let start = jan() + Duration::hours(1);
    let end = jan() + Duration::days(30);
    let event_at = jan() + Duration::hours(2);
    let touched = jan() + Duration::hours(3);

    let patch = SubscriptionPatch::at(touched)
        .tier(Tier::Premium)
        .status(SubscriptionStatus::Trial)
        .source(Some(SubscriptionSource::Web))
        .customer_id(Some("cus_1".into()))
        .subscription_id(Some("sub_1".into()))
        .start_date(Some(start))
        .end_date(Some(end))
        .webhook_event("customer.subscription.updated", event_at);

    let returned = store.update("u1", patch).await?;
    let stored = store.find("u1").await?;
    ensure_eq!(returned, stored);

    let rec = stored.ok_or("record vanished")?;
    ensure_eq!(rec.tier, Tier::Premium);
    ensure_eq!(rec.status, SubscriptionStatus::Trial);
    ensure_eq!(rec.subscription_source, Some(SubscriptionSource::Web));
    ensure_eq!(rec.stripe_customer_id.as_deref(), Some("cus_1"));
    ensure_eq!(rec.stripe_subscription_id.as_deref(), Some("sub_1"));
    ensure_eq!(rec.subscription_start_date, Some(start));
    ensure_eq!(rec.subscription_end_date, Some(end));
    ensure_eq!(rec.last_webhook_event.as_deref(), Some("customer.subscription.updated"));
    ensure_eq!(rec.last_webhook_event_date, Some(event_at));
    ensure_eq!(rec.updated_at, touched);
    ensure_eq!(rec.created_at, jan());
    Ok(())
}

async fn update_missing_is_none<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    let res = store
        .update("nobody", SubscriptionPatch::at(jan()).tier(Tier::Basic))
        .await?;
    ensure!(res.is_none(), "update created a record");
    ensure!(store.find("nobody").await?.is_none(), "update created a record");
    Ok(())
}

async fn update_clears_nullable_columns<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;
    store
        .update(
            "u1",
            SubscriptionPatch::at(jan())
                .end_date(Some(feb()))
                .customer_id(Some("cus_1".into())),
        )
        .await?;
    let rec = store
        .update("u1", SubscriptionPatch::at(jan()).end_date(None))
        .await?
        .ok_or("record vanished")?;
    ensure!(rec.subscription_end_date.is_none(), "end date not cleared");
    ensure_eq!(rec.stripe_customer_id.as_deref(), Some("cus_1"));
    Ok(())
}

async fn update_unless_newer_skips_older_events<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    let missing = store
        .update_unless_newer("ghost", SubscriptionPatch::at(jan()).tier(Tier::Basic), jan())
        .await?;
    ensure!(missing.is_none(), "patched a missing record");

    store.get_or_create("u1", jan()).await?;
    let first = store
        .update_unless_newer(
            "u1",
            SubscriptionPatch::at(feb())
                .status(SubscriptionStatus::Active)
                .webhook_event("invoice.paid", feb()),
            feb(),
        )
        .await?;
    ensure!(first.is_some(), "first event not applied");

    let older = store
        .update_unless_newer(
            "u1",
            SubscriptionPatch::at(feb())
                .status(SubscriptionStatus::Expired)
                .webhook_event("invoice.payment_failed", jan()),
            jan(),
        )
        .await?;
    ensure!(older.is_none(), "older event was applied");

    let same_time = store
        .update_unless_newer(
            "u1",
            SubscriptionPatch::at(feb())
                .tier(Tier::Premium)
                .webhook_event("customer.subscription.updated", feb()),
            feb(),
        )
        .await?;
    ensure!(same_time.is_some(), "event with the same date was rejected");

    let rec = store.find("u1").await?.ok_or("record vanished")?;
    ensure_eq!(rec.status, SubscriptionStatus::Active);
    ensure_eq!(rec.tier, Tier::Premium);
    ensure_eq!(rec.last_webhook_event_date, Some(feb()));
    Ok(())
}

async fn concurrent_event_updates_keep_newest<S: SubscriptionStore + 'static>(
    store: Arc<S>,
) -> CaseResult {
    store.get_or_create("u1", jan()).await?;

    let mut handles = Vec::new();
    for i in (0..12i64).rev() {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let at = jan() + Duration::hours(i);
            store
                .update_unless_newer(
                    "u1",
                    SubscriptionPatch::at(at).webhook_event(format!("evt.{i}"), at),
                    at,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let rec = store.find("u1").await?.ok_or("record vanished")?;
    ensure_eq!(rec.last_webhook_event.as_deref(), Some("evt.11"));
    ensure_eq!(rec.last_webhook_event_date, Some(jan() + Duration::hours(11)));
    Ok(())
}

async fn upsert_creates_then_patches<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    let rec = store
        .upsert(
            "fresh",
            SubscriptionPatch::at(jan())
                .tier(Tier::Basic)
                .source(Some(SubscriptionSource::Web)),
            jan(),
        )
        .await?;
    ensure_eq!(rec.tier, Tier::Basic);
    ensure_eq!(rec.monthly_recipe_count, 0);
    ensure_eq!(rec.subscription_source, Some(SubscriptionSource::Web));
    Ok(())
}

async fn find_by_subscription_id<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;
    store.get_or_create("u2", jan()).await?;
    store
        .update("u2", SubscriptionPatch::at(jan()).subscription_id(Some("sub_2".into())))
        .await?;

    let rec = store
        .find_by_subscription_id("sub_2")
        .await?
        .ok_or("subscription id not found")?;
    ensure_eq!(rec.user_id, "u2");
    Ok(())
}

async fn increment_missing_is_none<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    let res = store
        .increment_usage("nobody", CountableFeature::Audio, day(jan()), jan())
        .await?;
    ensure!(res.is_none(), "increment on missing record returned {res:?}");
    ensure!(store.find("nobody").await?.is_none(), "increment created a record");
    Ok(())
}

async fn increment_within_month<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;
    for expected in 1..=3u32 {
        let n = store
            .increment_usage("u1", CountableFeature::Recipe, day(jan()), jan())
            .await?;
        ensure_eq!(n, Some(expected));
    }
    let n = store
        .increment_usage("u1", CountableFeature::Audio, day(jan()), jan())
        .await?;
    ensure_eq!(n, Some(1));

    let rec = store.find("u1").await?.ok_or("record vanished")?;
    ensure_eq!(rec.monthly_recipe_count, 3);
    ensure_eq!(rec.monthly_audio_count, 1);
    ensure_eq!(rec.last_reset_date, day(jan()));
    Ok(())
}

async fn increment_resets_stale_period<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", jan()).await?;
    for _ in 0..5 {
        store
            .increment_usage("u1", CountableFeature::Recipe, day(jan()), jan())
            .await?;
    }
    store
        .increment_usage("u1", CountableFeature::Audio, day(jan()), jan())
        .await?;

    let first = store
        .increment_usage("u1", CountableFeature::Recipe, day(feb()), feb())
        .await?;
    let second = store
        .increment_usage("u1", CountableFeature::Recipe, day(feb()), feb())
        .await?;
    ensure_eq!(first, Some(1));
    ensure_eq!(second, Some(2));

    let rec = store.find("u1").await?.ok_or("record vanished")?;
    ensure_eq!(rec.monthly_recipe_count, 2);
    ensure_eq!(rec.monthly_audio_count, 0);
    ensure_eq!(rec.last_reset_date, day(feb()));
    ensure_eq!(rec.updated_at, feb());
    Ok(())
}

async fn increment_never_moves_reset_backwards<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    store.get_or_create("u1", feb()).await?;
    let n = store
        .increment_usage("u1", CountableFeature::Recipe, day(jan()), jan())
        .await?;
    ensure_eq!(n, Some(1));
    let rec = store.find("u1").await?.ok_or("record vanished")?;
    ensure_eq!(rec.last_reset_date, day(feb()));
    Ok(())
}

async fn concurrent_increments_lose_nothing<S: SubscriptionStore + 'static>(
    store: Arc<S>,
) -> CaseResult {
    const START: u32 = 3;
    const WRITERS: u32 = 40;

    store.get_or_create("hot", jan()).await?;
    for _ in 0..START {
        store
            .increment_usage("hot", CountableFeature::Recipe, day(jan()), jan())
            .await?;
    }

    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .increment_usage("hot", CountableFeature::Recipe, day(jan()), jan())
                .await
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await??.ok_or("record vanished")?);
    }
    seen.sort_unstable();
    let expected: Vec<u32> = (START + 1..=START + WRITERS).collect();
    ensure_eq!(seen, expected);

    let rec = store.find("hot").await?.ok_or("record vanished")?;
    ensure_eq!(rec.monthly_recipe_count, START + WRITERS);
    Ok(())
}

fn entry(event_id: &str, marker: &str) -> WebhookEventEntry {
    WebhookEventEntry {
        event_id: event_id.to_string(),
        event_type: "invoice.paid".to_string(),
        source: "stripe".to_string(),
        payload: serde_json::json!({ "id": event_id, "marker": marker }),
        received_at: jan(),
    }
}

async fn webhook_event_recorded_once<S: SubscriptionStore>(store: Arc<S>) -> CaseResult {
    ensure!(store.record_webhook_event(entry("evt_1", "first")).await?, "first insert refused");
    ensure!(
        !store.record_webhook_event(entry("evt_1", "second")).await?,
        "duplicate insert accepted"
    );

    let stored = store
        .find_webhook_event("evt_1")
        .await?
        .ok_or("event not stored")?;
    ensure_eq!(stored.payload["marker"], "first");
    ensure_eq!(stored.received_at, jan());
    ensure!(store.find_webhook_event("evt_2").await?.is_none(), "ghost event");
    Ok(())
}

async fn concurrent_webhook_insert_single_winner<S: SubscriptionStore + 'static>(
    store: Arc<S>,
) -> CaseResult {
    let mut handles = Vec::new();
    for i in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .record_webhook_event(entry("evt_race", &i.to_string()))
                .await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await?? {
            winners += 1;
        }
    }
    ensure_eq!(winners, 1);
    Ok(())
}
