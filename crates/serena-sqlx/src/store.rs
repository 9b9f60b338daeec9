// SqlxStore: `SubscriptionStore` over a `sqlx::AnyPool`.
//
// Each trait call is a single statement, so atomicity comes from the
// database: the increment folds its monthly reset into one UPDATE, and both
// inserts rely on ON CONFLICT DO NOTHING.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use tracing::{debug, trace};

use serena_core::db::store::StoreResult;
use serena_core::period::period_key;
use serena_core::{
    CountableFeature, SerenaError, SubscriptionPatch, SubscriptionRecord, SubscriptionSource,
    SubscriptionStore, WebhookEventEntry,
};

use crate::migration::{run_migrations, DatabaseKind};
use crate::query::{self, encode_date, encode_ts};

/// SQL-backed subscription store.
#[derive(Debug, Clone)]
pub struct SqlxStore {
    pool: AnyPool,
    kind: DatabaseKind,
}

impl SqlxStore {
    pub fn new(pool: AnyPool, kind: DatabaseKind) -> Self {
        Self { pool, kind }
    }

    /// Connect to a database URL (`sqlite:...` or `postgres://...`).
    pub async fn connect(url: &str) -> Result<Self, SerenaError> {
        let kind = DatabaseKind::from_url(url)?;
        sqlx::any::install_default_drivers();

        // Every connection to an in-memory SQLite URL opens its own empty
        // database, so the pool must hold exactly one.
        let pool = if url.contains(":memory:") || url.contains("mode=memory") {
            AnyPoolOptions::new().max_connections(1).connect(url).await
        } else {
            AnyPool::connect(url).await
        }
        .map_err(|e| SerenaError::Store(format!("Database connection failed: {e}")))?;

        Ok(Self { pool, kind })
    }

    /// Connect and apply the schema.
    pub async fn connect_and_migrate(url: &str) -> Result<Self, SerenaError> {
        let store = Self::connect(url).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<usize, SerenaError> {
        run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }
}

fn query_failed(e: sqlx::Error) -> SerenaError {
    SerenaError::Store(format!("Query failed: {e}"))
}

fn bind_all<'q>(
    mut q: Query<'q, Any, AnyArguments<'q>>,
    binds: Vec<Option<String>>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in binds {
        q = q.bind(value);
    }
    q
}

fn decode_err(column: &str, detail: impl std::fmt::Display) -> SerenaError {
    SerenaError::Store(format!("bad value in column {column}: {detail}"))
}

fn text(row: &AnyRow, column: &str) -> StoreResult<String> {
    row.try_get::<String, _>(column).map_err(|e| decode_err(column, e))
}

fn opt_text(row: &AnyRow, column: &str) -> StoreResult<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|e| decode_err(column, e))
}

fn parse_ts(column: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_err(column, e))
}

fn ts(row: &AnyRow, column: &str) -> StoreResult<DateTime<Utc>> {
    parse_ts(column, &text(row, column)?)
}

fn opt_ts(row: &AnyRow, column: &str) -> StoreResult<Option<DateTime<Utc>>> {
    opt_text(row, column)?
        .map(|raw| parse_ts(column, &raw))
        .transpose()
}

fn counter(row: &AnyRow, column: &str) -> StoreResult<u32> {
    let raw = row.try_get::<i64, _>(column).map_err(|e| decode_err(column, e))?;
    u32::try_from(raw).map_err(|e| decode_err(column, e))
}

fn parsed<T>(row: &AnyRow, column: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    text(row, column)?.parse().map_err(|e: String| decode_err(column, e))
}

fn decode_record(row: &AnyRow) -> StoreResult<SubscriptionRecord> {
    let last_reset = text(row, "last_reset_date")?;
    Ok(SubscriptionRecord {
        user_id: text(row, "user_id")?,
        tier: parsed(row, "tier")?,
        status: parsed(row, "status")?,
        monthly_recipe_count: counter(row, "monthly_recipe_count")?,
        monthly_audio_count: counter(row, "monthly_audio_count")?,
        last_reset_date: NaiveDate::parse_from_str(&last_reset, "%Y-%m-%d")
            .map_err(|e| decode_err("last_reset_date", e))?,
        subscription_source: opt_text(row, "subscription_source")?
            .map(|raw| raw.parse::<SubscriptionSource>())
            .transpose()
            .map_err(|e: String| decode_err("subscription_source", e))?,
        stripe_customer_id: opt_text(row, "stripe_customer_id")?,
        stripe_subscription_id: opt_text(row, "stripe_subscription_id")?,
        subscription_start_date: opt_ts(row, "subscription_start_date")?,
        subscription_end_date: opt_ts(row, "subscription_end_date")?,
        last_webhook_event: opt_text(row, "last_webhook_event")?,
        last_webhook_event_date: opt_ts(row, "last_webhook_event_date")?,
        created_at: ts(row, "created_at")?,
        updated_at: ts(row, "updated_at")?,
    })
}

fn decode_webhook_event(row: &AnyRow) -> StoreResult<WebhookEventEntry> {
    let payload = text(row, "payload")?;
    Ok(WebhookEventEntry {
        event_id: text(row, "event_id")?,
        event_type: text(row, "event_type")?,
        source: text(row, "source")?,
        payload: serde_json::from_str(&payload)?,
        received_at: ts(row, "received_at")?,
    })
}

impl SqlxStore {
    async fn find_by(&self, column: &str, value: &str) -> StoreResult<Option<SubscriptionRecord>> {
        let sql = query::select_by(column);
        let row = sqlx::query(&sql)
            .bind(value.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(decode_record).transpose()
    }
}

#[async_trait]
impl SubscriptionStore for SqlxStore {
    async fn find(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        self.find_by("user_id", user_id).await
    }

    async fn find_by_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.find_by("stripe_subscription_id", stripe_subscription_id)
            .await
    }

    async fn get_or_create(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<SubscriptionRecord> {
        let sql = query::insert_free();
        let inserted = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(encode_date(now.date_naive()))
            .bind(encode_ts(now))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?
            .rows_affected();
        if inserted > 0 {
            debug!(user_id, "subscription record created");
        }

        self.find(user_id).await?.ok_or_else(|| {
            SerenaError::Store(format!("record for user {user_id} missing after insert"))
        })
    }

    async fn update(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let Some(fragment) = query::build_update(user_id, &patch) else {
            return self.find(user_id).await;
        };
        trace!(sql = %fragment.sql, "update subscription");

        let row = bind_all(sqlx::query(&fragment.sql), fragment.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(decode_record).transpose()
    }

    async fn update_unless_newer(
        &self,
        user_id: &str,
        patch: SubscriptionPatch,
        event_at: DateTime<Utc>,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let Some(fragment) = query::build_conditional_update(user_id, &patch, event_at) else {
            let record = self.find(user_id).await?;
            return Ok(record.filter(|r| r.last_webhook_event_date.map_or(true, |last| last <= event_at)));
        };
        trace!(sql = %fragment.sql, "conditional update subscription");

        let row = bind_all(sqlx::query(&fragment.sql), fragment.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(decode_record).transpose()
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        counter: CountableFeature,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let sql = query::increment_usage(counter);
        let row = sqlx::query(&sql)
            .bind(period_key(today))
            .bind(encode_date(today))
            .bind(encode_ts(now))
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let count = row
            .try_get::<i64, _>(0)
            .map_err(|e| decode_err("counter", e))?;
        u32::try_from(count)
            .map(Some)
            .map_err(|e| decode_err("counter", e))
    }

    async fn record_webhook_event(&self, entry: WebhookEventEntry) -> StoreResult<bool> {
        let sql = query::insert_webhook_event();
        let inserted = sqlx::query(&sql)
            .bind(entry.event_id)
            .bind(entry.event_type)
            .bind(entry.source)
            .bind(serde_json::to_string(&entry.payload)?)
            .bind(encode_ts(entry.received_at))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?
            .rows_affected();
        Ok(inserted == 1)
    }

    async fn find_webhook_event(&self, event_id: &str) -> StoreResult<Option<WebhookEventEntry>> {
        let sql = query::select_webhook_event();
        let row = sqlx::query(&sql)
            .bind(event_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(decode_webhook_event).transpose()
    }
}
