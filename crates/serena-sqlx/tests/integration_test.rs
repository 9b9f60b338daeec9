// SQLite-backed checks that the shared conformance suite does not cover:
// migrations and the on-disk encoding of rows.

use chrono::{TimeZone, Utc};
use serena_core::{CountableFeature, SubscriptionPatch, SubscriptionStore, Tier};
use serena_sqlx::migration::missing_tables;
use serena_sqlx::{DatabaseKind, SqlxStore};
use sqlx::Row;

async fn setup_store() -> SqlxStore {
    SqlxStore::connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to open SQLite in-memory store")
}

// ─── Migrations ──────────────────────────────────────────────────

#[tokio::test]
async fn test_migrate_creates_tables() {
    let store = SqlxStore::connect("sqlite::memory:").await.unwrap();
    assert_eq!(store.kind(), DatabaseKind::Sqlite);

    let before = missing_tables(store.pool(), store.kind()).await.unwrap();
    assert_eq!(before, vec!["subscriptions", "webhook_events"]);

    store.migrate().await.unwrap();
    let after = missing_tables(store.pool(), store.kind()).await.unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let store = setup_store().await;
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    store.get_or_create("u1", now).await.unwrap();

    store.migrate().await.unwrap();
    assert!(store.find("u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unsupported_url_is_rejected() {
    let err = SqlxStore::connect("mysql://localhost/serena").await.unwrap_err();
    assert!(err.to_string().contains("unsupported database url"));
}

// ─── Encoding ────────────────────────────────────────────────────

#[tokio::test]
async fn test_rows_are_stored_as_text() {
    let store = setup_store().await;
    let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 30, 0).unwrap();
    store.get_or_create("u1", now).await.unwrap();
    store
        .update("u1", SubscriptionPatch::at(now).tier(Tier::Premium))
        .await
        .unwrap();

    let row = sqlx::query("SELECT tier, last_reset_date, updated_at FROM subscriptions WHERE user_id = $1")
        .bind("u1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("tier"), "PREMIUM");
    assert_eq!(row.get::<String, _>("last_reset_date"), "2025-03-09");
    assert_eq!(row.get::<String, _>("updated_at"), "2025-03-09T14:30:00Z");
}

#[tokio::test]
async fn test_check_constraint_rejects_unknown_tier() {
    let store = setup_store().await;
    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, tier, last_reset_date, created_at, updated_at) \
         VALUES ('u1', 'GOLD', '2025-01-01', 'x', 'x')",
    )
    .execute(store.pool())
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_increment_resets_across_months() {
    let store = setup_store().await;
    let jan = Utc.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap();
    let feb = Utc.with_ymd_and_hms(2025, 2, 1, 1, 0, 0).unwrap();
    store.get_or_create("u1", jan).await.unwrap();

    for _ in 0..3 {
        store
            .increment_usage("u1", CountableFeature::Audio, jan.date_naive(), jan)
            .await
            .unwrap();
    }
    let n = store
        .increment_usage("u1", CountableFeature::Recipe, feb.date_naive(), feb)
        .await
        .unwrap();
    assert_eq!(n, Some(1));

    let rec = store.find("u1").await.unwrap().unwrap();
    assert_eq!(rec.monthly_audio_count, 0);
    assert_eq!(rec.monthly_recipe_count, 1);
    assert_eq!(rec.last_reset_date, feb.date_naive());
}
