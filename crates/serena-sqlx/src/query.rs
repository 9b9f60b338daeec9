// SQL text for the subscription store, with positional `$N` parameters.
//
// Every bind is text or NULL: enums go in as their wire names, dates as
// `YYYY-MM-DD`, timestamps as RFC 3339.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serena_core::{CountableFeature, SubscriptionPatch};

/// Columns of `subscriptions`, in select order.
pub const SUBSCRIPTION_COLUMNS: &str = "user_id, tier, status, monthly_recipe_count, \
     monthly_audio_count, last_reset_date, subscription_source, stripe_customer_id, \
     stripe_subscription_id, subscription_start_date, subscription_end_date, \
     last_webhook_event, last_webhook_event_date, created_at, updated_at";

/// A statement and its bind values in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Option<String>>,
}

pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn select_by(column: &str) -> String {
    format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE {column} = $1")
}

pub fn insert_free() -> String {
    "INSERT INTO subscriptions (user_id, tier, status, monthly_recipe_count, monthly_audio_count, \
     last_reset_date, created_at, updated_at) \
     VALUES ($1, 'FREE', 'active', 0, 0, $2, $3, $3) \
     ON CONFLICT (user_id) DO NOTHING"
        .to_string()
}

/// `UPDATE ... RETURNING` for the columns a patch touches. `None` when the
/// patch sets nothing at all.
pub fn build_update(user_id: &str, patch: &SubscriptionPatch) -> Option<SqlFragment> {
    update_statement(user_id, patch, None)
}

/// Like [`build_update`], but matches no row when `last_webhook_event_date`
/// is later than `event_at`.
///
/// The comparison is on text. Webhook event dates are whole seconds, so
/// their encoded form sorts chronologically.
pub fn build_conditional_update(
    user_id: &str,
    patch: &SubscriptionPatch,
    event_at: DateTime<Utc>,
) -> Option<SqlFragment> {
    update_statement(user_id, patch, Some(event_at))
}

fn update_statement(
    user_id: &str,
    patch: &SubscriptionPatch,
    not_newer_than: Option<DateTime<Utc>>,
) -> Option<SqlFragment> {
    let mut sets: Vec<(&str, Option<String>)> = Vec::new();

    if let Some(tier) = patch.tier {
        sets.push(("tier", Some(tier.as_str().to_string())));
    }
    if let Some(status) = patch.status {
        sets.push(("status", Some(status.as_str().to_string())));
    }
    if let Some(source) = patch.subscription_source {
        sets.push(("subscription_source", source.map(|s| s.as_str().to_string())));
    }
    if let Some(ref id) = patch.stripe_customer_id {
        sets.push(("stripe_customer_id", id.clone()));
    }
    if let Some(ref id) = patch.stripe_subscription_id {
        sets.push(("stripe_subscription_id", id.clone()));
    }
    if let Some(date) = patch.subscription_start_date {
        sets.push(("subscription_start_date", date.map(encode_ts)));
    }
    if let Some(date) = patch.subscription_end_date {
        sets.push(("subscription_end_date", date.map(encode_ts)));
    }
    if let Some(ref event) = patch.last_webhook_event {
        sets.push(("last_webhook_event", event.clone()));
    }
    if let Some(date) = patch.last_webhook_event_date {
        sets.push(("last_webhook_event_date", date.map(encode_ts)));
    }
    if let Some(at) = patch.updated_at {
        sets.push(("updated_at", Some(encode_ts(at))));
    }

    if sets.is_empty() {
        return None;
    }

    let assignments = sets
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ${}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let user_param = sets.len() + 1;

    let mut binds: Vec<Option<String>> = sets.into_iter().map(|(_, value)| value).collect();
    binds.push(Some(user_id.to_string()));

    let guard = match not_newer_than {
        Some(event_at) => {
            binds.push(Some(encode_ts(event_at)));
            format!(
                " AND (last_webhook_event_date IS NULL OR last_webhook_event_date <= ${})",
                user_param + 1
            )
        }
        None => String::new(),
    };

    Some(SqlFragment {
        sql: format!(
            "UPDATE subscriptions SET {assignments} WHERE user_id = ${user_param}{guard} \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ),
        binds,
    })
}

fn counter_columns(counter: CountableFeature) -> (&'static str, &'static str) {
    match counter {
        CountableFeature::Recipe => ("monthly_recipe_count", "monthly_audio_count"),
        CountableFeature::Audio => ("monthly_audio_count", "monthly_recipe_count"),
    }
}

/// Reset-if-stale and increment in one statement.
///
/// Binds: `$1` period key of today (`YYYY-MM`), `$2` today, `$3` now,
/// `$4` user id. Every right-hand side reads the pre-update row, so the
/// staleness test sees the old `last_reset_date` in all three branches.
pub fn increment_usage(counter: CountableFeature) -> String {
    let (counted, other) = counter_columns(counter);
    let stale = "substr(last_reset_date, 1, 7) < $1";
    format!(
        "UPDATE subscriptions SET \
         {counted} = CASE WHEN {stale} THEN 1 ELSE {counted} + 1 END, \
         {other} = CASE WHEN {stale} THEN 0 ELSE {other} END, \
         last_reset_date = CASE WHEN {stale} THEN $2 ELSE last_reset_date END, \
         updated_at = $3 \
         WHERE user_id = $4 \
         RETURNING {counted}"
    )
}

pub fn insert_webhook_event() -> String {
    "INSERT INTO webhook_events (event_id, event_type, source, payload, received_at) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (event_id) DO NOTHING"
        .to_string()
}

pub fn select_webhook_event() -> String {
    "SELECT event_id, event_type, source, payload, received_at \
     FROM webhook_events WHERE event_id = $1"
        .to_string()
}
