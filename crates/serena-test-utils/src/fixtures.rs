//! Record and webhook fixtures.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use serena_billing::webhook::sign_payload;
use serena_core::{SubscriptionRecord, SubscriptionSource, Tier};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const BASIC_PRICE: &str = "price_basic_monthly";
pub const PREMIUM_PRICE: &str = "price_premium_monthly";

/// Active record on `tier` with zero usage.
pub fn record(user_id: &str, tier: Tier, now: DateTime<Utc>) -> SubscriptionRecord {
    let mut rec = SubscriptionRecord::new_free(user_id, now);
    rec.tier = tier;
    rec
}

/// Active web subscription with provider ids.
pub fn web_record(
    user_id: &str,
    tier: Tier,
    customer_id: &str,
    subscription_id: &str,
    now: DateTime<Utc>,
) -> SubscriptionRecord {
    let mut rec = record(user_id, tier, now);
    rec.subscription_source = Some(SubscriptionSource::Web);
    rec.stripe_customer_id = Some(customer_id.to_string());
    rec.stripe_subscription_id = Some(subscription_id.to_string());
    rec.subscription_start_date = Some(now);
    rec
}

fn envelope(id: &str, event_type: &str, created: DateTime<Utc>, object: Value) -> Value {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": created.timestamp(),
        "data": { "object": object },
    })
}

pub fn checkout_completed(
    id: &str,
    user_id: &str,
    tier: Tier,
    customer_id: &str,
    subscription_id: &str,
    created: DateTime<Utc>,
) -> Value {
    envelope(
        id,
        "checkout.session.completed",
        created,
        json!({
            "id": format!("cs_{id}"),
            "object": "checkout.session",
            "customer": customer_id,
            "subscription": subscription_id,
            "metadata": { "user_id": user_id, "tier": tier.as_str() },
        }),
    )
}

pub fn subscription_event(
    id: &str,
    event_type: &str,
    subscription_id: &str,
    status: &str,
    price_id: &str,
    current_period_end: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
) -> Value {
    envelope(
        id,
        event_type,
        created,
        json!({
            "id": subscription_id,
            "object": "subscription",
            "status": status,
            "current_period_end": current_period_end.map(|t| t.timestamp()),
            "items": { "data": [ { "price": { "id": price_id } } ] },
        }),
    )
}

pub fn invoice_event(id: &str, event_type: &str, subscription_id: &str, created: DateTime<Utc>) -> Value {
    envelope(
        id,
        event_type,
        created,
        json!({
            "id": format!("in_{id}"),
            "object": "invoice",
            "subscription": subscription_id,
        }),
    )
}

/// Serialize `event` and sign it as of `signed_at`.
pub fn signed(event: &Value, secret: &str, signed_at: DateTime<Utc>) -> (Vec<u8>, String) {
    let body = event.to_string().into_bytes();
    let header = sign_payload(&body, secret, signed_at.timestamp())
        .unwrap_or_else(|e| panic!("signing failed: {e}"));
    (body, header)
}
