//! Billing DB schema.
//!
//! Dates and timestamps are RFC 3339 / ISO 8601 TEXT so the same statements
//! run on SQLite and Postgres.

pub const SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id TEXT PRIMARY KEY NOT NULL,
    tier TEXT NOT NULL DEFAULT 'FREE',
    status TEXT NOT NULL DEFAULT 'active',
    monthly_recipe_count BIGINT NOT NULL DEFAULT 0,
    monthly_audio_count BIGINT NOT NULL DEFAULT 0,
    last_reset_date TEXT NOT NULL,
    subscription_source TEXT,
    stripe_customer_id TEXT,
    stripe_subscription_id TEXT,
    subscription_start_date TEXT,
    subscription_end_date TEXT,
    last_webhook_event TEXT,
    last_webhook_event_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (tier IN ('FREE', 'BASIC', 'PREMIUM')),
    CHECK (status IN ('active', 'trial', 'cancelled', 'expired')),
    CHECK (subscription_source IS NULL OR subscription_source IN ('web', 'mobile')),
    CHECK (monthly_recipe_count >= 0 AND monthly_audio_count >= 0)
)
"#;

pub const SUBSCRIPTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_subscriptions_stripe_subscription_id
    ON subscriptions(stripe_subscription_id)
"#;

pub const WEBHOOK_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_events (
    event_id TEXT PRIMARY KEY NOT NULL,
    event_type TEXT NOT NULL,
    source TEXT NOT NULL,
    payload TEXT NOT NULL,
    received_at TEXT NOT NULL
)
"#;

/// Schema statements in application order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    SUBSCRIPTIONS_TABLE,
    SUBSCRIPTIONS_INDEX,
    WEBHOOK_EVENTS_TABLE,
];

/// The whole schema as one script, for printing.
pub fn schema_sql() -> String {
    SCHEMA_STATEMENTS
        .iter()
        .map(|stmt| format!("{};", stmt.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
