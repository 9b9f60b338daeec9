//! Webhook ingestion: signatures, idempotency and the transition table.

mod common;

use chrono::Duration;
use common::{t, user, Harness};
use serena_billing::{BillingError, WebhookAck};
use serena_core::{EventOrdering, Feature, SubscriptionSource, SubscriptionStatus, Tier};
use serena_test_utils::fixtures::{
    checkout_completed, invoice_event, signed, subscription_event, web_record, BASIC_PRICE,
    PREMIUM_PRICE, WEBHOOK_SECRET,
};

async fn deliver(h: &Harness, event: &serde_json::Value) -> WebhookAck {
    let (body, header) = signed(event, WEBHOOK_SECRET, h.now());
    h.service.ingest_webhook(&body, Some(&header)).await.unwrap()
}

// ── Signatures ──────────────────────────────────────────────────

#[tokio::test]
async fn tampered_body_is_acknowledged_without_mutation() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Premium, "cus_1", "sub_1", h.now());
    let (body, header) = signed(&event, WEBHOOK_SECRET, h.now());
    let tampered = String::from_utf8(body).unwrap().replace("PREMIUM", "BASIC");

    let ack = h
        .service
        .ingest_webhook(tampered.as_bytes(), Some(&header))
        .await
        .unwrap();

    assert!(ack.received);
    assert_eq!(ack.error.as_deref(), Some("invalid_signature"));
    assert_eq!(h.store.subscription_count().await, 0);
    assert_eq!(h.store.webhook_event_count().await, 0);
}

#[tokio::test]
async fn missing_signature_is_acknowledged_as_invalid() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());
    let body = event.to_string();

    for header in [None, Some(""), Some("   ")] {
        let ack = h.service.ingest_webhook(body.as_bytes(), header).await.unwrap();
        assert_eq!(ack.error.as_deref(), Some("invalid_signature"));
    }
    assert_eq!(h.store.subscription_count().await, 0);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());
    let (body, header) = signed(&event, "whsec_someone_else", h.now());
    let ack = h.service.ingest_webhook(&body, Some(&header)).await.unwrap();
    assert_eq!(ack.error.as_deref(), Some("invalid_signature"));
}

#[tokio::test]
async fn replayed_old_signature_is_rejected() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());
    let (body, header) = signed(&event, WEBHOOK_SECRET, h.now() - Duration::minutes(10));
    let ack = h.service.ingest_webhook(&body, Some(&header)).await.unwrap();
    assert_eq!(ack.error.as_deref(), Some("invalid_signature"));
    assert_eq!(h.store.subscription_count().await, 0);
}

// ── Payload shape ───────────────────────────────────────────────

#[tokio::test]
async fn signed_non_json_body_is_an_error() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let body = b"definitely not json";
    let header =
        serena_billing::webhook::sign_payload(body, WEBHOOK_SECRET, h.now().timestamp()).unwrap();
    let err = h.service.ingest_webhook(body, Some(&header)).await.unwrap_err();
    assert_eq!(err, BillingError::WebhookPayloadMalformed);
}

#[tokio::test]
async fn event_without_id_is_acknowledged_as_invalid() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = serde_json::json!({ "type": "invoice.paid", "data": { "object": {} } });
    let ack = deliver(&h, &event).await;
    assert_eq!(ack.error.as_deref(), Some("invalid_event"));
    assert_eq!(h.store.webhook_event_count().await, 0);
}

#[tokio::test]
async fn unhandled_event_type_is_logged_and_ignored() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = serde_json::json!({
        "id": "evt_x",
        "type": "customer.created",
        "created": h.now().timestamp(),
        "data": { "object": { "id": "cus_1" } }
    });
    let ack = deliver(&h, &event).await;
    assert_eq!(ack, WebhookAck::ignored());
    assert_eq!(h.store.webhook_event_count().await, 1);
}

// ── Checkout completion ─────────────────────────────────────────

#[tokio::test]
async fn checkout_completed_activates_basic() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());

    let ack = deliver(&h, &event).await;
    assert_eq!(ack, WebhookAck::applied());

    let rec = h.record("alice").await;
    assert_eq!(rec.tier, Tier::Basic);
    assert_eq!(rec.status, SubscriptionStatus::Active);
    assert_eq!(rec.subscription_source, Some(SubscriptionSource::Web));
    assert_eq!(rec.stripe_customer_id.as_deref(), Some("cus_1"));
    assert_eq!(rec.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert_eq!(rec.subscription_start_date, Some(h.now()));
    assert_eq!(rec.last_webhook_event.as_deref(), Some("checkout.session.completed"));

    let audio = h.service.check(&user("alice"), Feature::GenerateAudio).await.unwrap();
    assert!(audio.allowed);
}

#[tokio::test]
async fn checkout_without_user_is_ignored() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let mut event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());
    event["data"]["object"]["metadata"] = serde_json::json!({});

    let ack = deliver(&h, &event).await;
    assert_eq!(ack, WebhookAck::ignored());
    assert_eq!(h.store.subscription_count().await, 0);
}

// ── Idempotency ─────────────────────────────────────────────────

#[tokio::test]
async fn redelivered_event_is_a_no_op() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Premium, "cus_1", "sub_1", h.now());

    assert_eq!(deliver(&h, &event).await, WebhookAck::applied());
    let after_first = h.record("alice").await;

    h.clock.advance(Duration::minutes(1));
    let second = deliver(&h, &event).await;
    assert!(second.is_duplicate());
    assert_eq!(h.record("alice").await, after_first);
    assert_eq!(h.store.webhook_event_count().await, 1);
}

#[tokio::test]
async fn concurrent_redeliveries_apply_once() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let event = checkout_completed("evt_1", "alice", Tier::Basic, "cus_1", "sub_1", h.now());
    let (body, header) = signed(&event, WEBHOOK_SECRET, h.now());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        let body = body.clone();
        let header = header.clone();
        tasks.push(tokio::spawn(async move {
            service.ingest_webhook(&body, Some(&header)).await.unwrap()
        }));
    }
    let mut applied = 0;
    let mut duplicates = 0;
    for task in tasks {
        let ack = task.await.unwrap();
        if ack.is_duplicate() {
            duplicates += 1;
        } else if ack.success == Some(true) {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 7);
}

// ── Subscription lifecycle ──────────────────────────────────────

#[tokio::test]
async fn subscription_update_changes_tier_and_period_end() {
    let h = Harness::new(t(2025, 6, 1, 12));
    h.seed(web_record("alice", Tier::Basic, "cus_1", "sub_1", h.now())).await;
    let period_end = h.now() + Duration::days(30);

    let event = subscription_event(
        "evt_2",
        "customer.subscription.updated",
        "sub_1",
        "active",
        PREMIUM_PRICE,
        Some(period_end),
        h.now(),
    );
    assert_eq!(deliver(&h, &event).await, WebhookAck::applied());

    let rec = h.record("alice").await;
    assert_eq!(rec.tier, Tier::Premium);
    assert_eq!(rec.status, SubscriptionStatus::Active);
    assert_eq!(rec.subscription_end_date, Some(period_end));
}

#[tokio::test]
async fn past_due_subscription_expires_without_changing_tier() {
    let h = Harness::new(t(2025, 6, 1, 12));
    h.seed(web_record("alice", Tier::Premium, "cus_1", "sub_1", h.now())).await;

    let event = subscription_event(
        "evt_2",
        "customer.subscription.updated",
        "sub_1",
        "past_due",
        BASIC_PRICE,
        None,
        h.now(),
    );
    deliver(&h, &event).await;

    let rec = h.record("alice").await;
    assert_eq!(rec.status, SubscriptionStatus::Expired);
    assert_eq!(rec.tier, Tier::Premium);
}

#[tokio::test]
async fn deleted_subscription_drops_to_free() {
    let h = Harness::new(t(2025, 6, 1, 12));
    h.seed(web_record("alice", Tier::Premium, "cus_1", "sub_1", h.now())).await;

    let event = subscription_event(
        "evt_3",
        "customer.subscription.deleted",
        "sub_1",
        "canceled",
        PREMIUM_PRICE,
        None,
        h.now(),
    );
    assert_eq!(deliver(&h, &event).await, WebhookAck::applied());

    let rec = h.record("alice").await;
    assert_eq!(rec.tier, Tier::Free);
    assert_eq!(rec.status, SubscriptionStatus::Cancelled);
    assert_eq!(rec.subscription_end_date, Some(h.now()));
}

#[tokio::test]
async fn invoice_events_toggle_status() {
    let h = Harness::new(t(2025, 6, 1, 12));
    h.seed(web_record("alice", Tier::Basic, "cus_1", "sub_1", h.now())).await;

    deliver(&h, &invoice_event("evt_4", "invoice.payment_failed", "sub_1", h.now())).await;
    assert_eq!(h.record("alice").await.status, SubscriptionStatus::Expired);

    deliver(&h, &invoice_event("evt_5", "invoice.paid", "sub_1", h.now())).await;
    assert_eq!(h.record("alice").await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn event_for_unknown_subscription_is_ignored() {
    let h = Harness::new(t(2025, 6, 1, 12));
    let ack = deliver(&h, &invoice_event("evt_6", "invoice.payment_failed", "sub_missing", h.now())).await;
    assert_eq!(ack, WebhookAck::ignored());
    assert_eq!(h.store.subscription_count().await, 0);
}

// ── Ordering ────────────────────────────────────────────────────

#[tokio::test]
async fn arrival_order_applies_late_events() {
    let h = Harness::new(t(2025, 6, 1, 12));
    h.seed(web_record("alice", Tier::Basic, "cus_1", "sub_1", h.now())).await;

    let newer = invoice_event("evt_new", "invoice.payment_failed", "sub_1", h.now());
    let older = invoice_event("evt_old", "invoice.paid", "sub_1", h.now() - Duration::hours(1));
    deliver(&h, &newer).await;
    assert_eq!(deliver(&h, &older).await, WebhookAck::applied());
    assert_eq!(h.record("alice").await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn provider_timestamp_order_discards_stale_events() {
    let h = Harness::with_ordering(t(2025, 6, 1, 12), EventOrdering::ProviderTimestamp);
    h.seed(web_record("alice", Tier::Basic, "cus_1", "sub_1", h.now())).await;

    let newer = invoice_event("evt_new", "invoice.payment_failed", "sub_1", h.now());
    let older = invoice_event("evt_old", "invoice.paid", "sub_1", h.now() - Duration::hours(1));
    assert_eq!(deliver(&h, &newer).await, WebhookAck::applied());
    assert_eq!(deliver(&h, &older).await, WebhookAck::stale());

    let rec = h.record("alice").await;
    assert_eq!(rec.status, SubscriptionStatus::Expired);
    assert_eq!(rec.last_webhook_event_date, Some(h.now()));
    // Both deliveries are logged.
    assert_eq!(h.store.webhook_event_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn provider_timestamp_order_holds_under_concurrent_delivery() {
    let h = Harness::with_ordering(t(2025, 6, 1, 12), EventOrdering::ProviderTimestamp);
    h.seed(web_record("alice", Tier::Basic, "cus_1", "sub_1", h.now())).await;

    let mut tasks = Vec::new();
    for i in 0..10i64 {
        let kind = if i % 2 == 0 { "invoice.payment_failed" } else { "invoice.paid" };
        let created = h.now() - Duration::minutes(10 - i);
        let event = invoice_event(&format!("evt_{i}"), kind, "sub_1", created);
        let (body, header) = signed(&event, WEBHOOK_SECRET, h.now());
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service.ingest_webhook(&body, Some(&header)).await.unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().error.is_none());
    }

    // Whatever the interleaving, the newest event wins.
    let rec = h.record("alice").await;
    assert_eq!(rec.last_webhook_event.as_deref(), Some("invoice.paid"));
    assert_eq!(rec.last_webhook_event_date, Some(h.now() - Duration::minutes(1)));
    assert_eq!(rec.status, SubscriptionStatus::Active);
}
