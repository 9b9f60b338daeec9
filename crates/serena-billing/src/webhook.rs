//! Billing-provider webhook signature verification and event decoding.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serena_core::{PriceIds, SubscriptionStatus, Tier};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::tier_for_price;
use crate::error::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

fn compute_signature(payload: &[u8], timestamp: &str, secret: &str) -> Result<String, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook signature.
///
/// Header format: `t=<unix timestamp>,v1=<hex hmac>[,v1=<hex hmac>...]`. The
/// HMAC-SHA256 is computed over `{t}.{raw body}`. Any matching `v1` entry
/// passes. When `tolerance_secs` is non-zero, timestamps older than that
/// relative to `now` are rejected. Returns the signed timestamp.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now: DateTime<Utc>,
    tolerance_secs: u64,
) -> Result<i64, BillingError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in signature_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    if candidates.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid);
    }
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;

    let expected = compute_signature(payload, timestamp, webhook_secret)?;
    let matched = candidates
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));
    if !matched {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    if tolerance_secs > 0 {
        let age = now.timestamp().saturating_sub(signed_at);
        if age > i64::try_from(tolerance_secs).unwrap_or(i64::MAX) {
            return Err(BillingError::WebhookTimestampExpired);
        }
    }

    Ok(signed_at)
}

/// Produce a signature header for `payload`, as the provider would.
pub fn sign_payload(payload: &[u8], webhook_secret: &str, timestamp: i64) -> Result<String, BillingError> {
    let ts = timestamp.to_string();
    let sig = compute_signature(payload, &ts, webhook_secret)?;
    Ok(format!("t={ts},v1={sig}"))
}

/// Raw webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookEventData,
    /// Provider-side creation time, unix seconds.
    #[serde(default)]
    pub created: Option<i64>,
}

/// Webhook event data object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Parse a verified body. Not JSON is `WebhookPayloadMalformed`; JSON
    /// without a string `id` and `type` is `WebhookEventInvalid`.
    pub fn parse(payload: &[u8]) -> Result<(Self, serde_json::Value), BillingError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|_| BillingError::WebhookPayloadMalformed)?;
        let event = serde_json::from_value(value.clone())
            .map_err(|_| BillingError::WebhookEventInvalid)?;
        Ok((event, value))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Subscription status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Active,
    Trialing,
    Canceled,
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    Unknown,
}

/// Parse subscription status from a provider subscription object.
pub fn parse_subscription_status(status: &str) -> ProviderStatus {
    match status {
        "active" => ProviderStatus::Active,
        "trialing" => ProviderStatus::Trialing,
        "canceled" => ProviderStatus::Canceled,
        "past_due" => ProviderStatus::PastDue,
        "unpaid" => ProviderStatus::Unpaid,
        "incomplete" => ProviderStatus::Incomplete,
        "incomplete_expired" => ProviderStatus::IncompleteExpired,
        "paused" => ProviderStatus::Paused,
        _ => ProviderStatus::Unknown,
    }
}

impl ProviderStatus {
    /// Local status this provider status maps to. `None` leaves it unchanged.
    pub fn local_status(self) -> Option<SubscriptionStatus> {
        match self {
            Self::Active => Some(SubscriptionStatus::Active),
            Self::Trialing => Some(SubscriptionStatus::Trial),
            Self::Canceled => Some(SubscriptionStatus::Cancelled),
            Self::PastDue | Self::Unpaid | Self::IncompleteExpired => {
                Some(SubscriptionStatus::Expired)
            }
            Self::Incomplete | Self::Paused | Self::Unknown => None,
        }
    }

    /// Whether the price on the subscription currently grants its tier.
    pub fn grants_tier(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// A decoded billing event.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted {
        user_id: Option<String>,
        tier: Tier,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    },
    SubscriptionChanged {
        subscription_id: String,
        user_id: Option<String>,
        status: ProviderStatus,
        tier: Tier,
        current_period_end: Option<DateTime<Utc>>,
    },
    SubscriptionDeleted {
        subscription_id: String,
    },
    PaymentFailed {
        subscription_id: Option<String>,
    },
    PaymentSucceeded {
        subscription_id: Option<String>,
    },
    /// A type this system does not act on, or a handled type whose object
    /// lacks the fields needed to act.
    Unhandled,
}

fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn metadata_user_id(object: &serde_json::Value) -> Option<String> {
    str_at(object, "/metadata/user_id")
        .or_else(|| str_at(object, "/metadata/userId"))
        .map(str::to_string)
}

/// Invoice subscription id, in either the flat or the nested parent layout.
fn invoice_subscription_id(object: &serde_json::Value) -> Option<String> {
    str_at(object, "/subscription")
        .or_else(|| str_at(object, "/parent/subscription_details/subscription"))
        .map(str::to_string)
}

/// Decode an envelope into a [`BillingEvent`].
pub fn decode_event(event: &WebhookEvent, prices: &PriceIds) -> BillingEvent {
    let object = &event.data.object;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let tier = str_at(object, "/metadata/tier")
                .and_then(|t| t.parse::<Tier>().ok())
                .unwrap_or_else(|| {
                    tier_for_price(prices, str_at(object, "/metadata/price_id").unwrap_or(""))
                });
            BillingEvent::CheckoutCompleted {
                user_id: metadata_user_id(object),
                tier,
                customer_id: str_at(object, "/customer").map(str::to_string),
                subscription_id: str_at(object, "/subscription").map(str::to_string),
            }
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let Some(subscription_id) = str_at(object, "/id") else {
                return BillingEvent::Unhandled;
            };
            let price_id = str_at(object, "/items/data/0/price/id").unwrap_or("");
            BillingEvent::SubscriptionChanged {
                subscription_id: subscription_id.to_string(),
                user_id: metadata_user_id(object),
                status: parse_subscription_status(str_at(object, "/status").unwrap_or("")),
                tier: tier_for_price(prices, price_id),
                current_period_end: object
                    .get("current_period_end")
                    .or_else(|| object.pointer("/items/data/0/current_period_end"))
                    .and_then(|v| v.as_i64())
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            }
        }
        "customer.subscription.deleted" => match str_at(object, "/id") {
            Some(id) => BillingEvent::SubscriptionDeleted {
                subscription_id: id.to_string(),
            },
            None => BillingEvent::Unhandled,
        },
        "invoice.payment_failed" => BillingEvent::PaymentFailed {
            subscription_id: invoice_subscription_id(object),
        },
        "invoice.payment_succeeded" | "invoice.paid" => BillingEvent::PaymentSucceeded {
            subscription_id: invoice_subscription_id(object),
        },
        _ => BillingEvent::Unhandled,
    }
}
