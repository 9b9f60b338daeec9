//! Webhook ingestion: verify, deduplicate, then apply the transition table.
//!
//! Every delivery is acknowledged except a body that is not JSON at all.
//! Internal failures are logged and still acknowledged, so the provider does
//! not retry into a storm.

use chrono::{DateTime, SubsecRound, Utc};
use serena_core::{
    EventOrdering, SerenaError, SubscriptionPatch, SubscriptionSource, SubscriptionStatus, Tier,
    WebhookEventEntry,
};
use tracing::{debug, error, info, warn};

use crate::error::BillingError;
use crate::types::WebhookAck;
use crate::webhook::{decode_event, verify_webhook_signature, BillingEvent, WebhookEvent};
use crate::BillingService;

/// Source tag written to the event log.
pub const EVENT_SOURCE: &str = "stripe";

/// Which record an event addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User(String),
    Subscription(String),
}

/// A state change derived from one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: Target,
    pub patch: SubscriptionPatch,
    /// Create the record first when the user has none.
    pub create_if_missing: bool,
}

/// Map an event to the change it makes, or `None` when it changes nothing.
pub fn transition(event: &BillingEvent, now: DateTime<Utc>) -> Option<Transition> {
    match event {
        BillingEvent::CheckoutCompleted {
            user_id,
            tier,
            customer_id,
            subscription_id,
        } => {
            let mut patch = SubscriptionPatch::at(now)
                .tier(*tier)
                .status(SubscriptionStatus::Active)
                .source(Some(SubscriptionSource::Web))
                .subscription_id(subscription_id.clone())
                .start_date(Some(now))
                .end_date(None);
            // The customer id is stable once assigned.
            if customer_id.is_some() {
                patch = patch.customer_id(customer_id.clone());
            }
            Some(Transition {
                target: Target::User(user_id.clone()?),
                patch,
                create_if_missing: true,
            })
        }
        BillingEvent::SubscriptionChanged {
            subscription_id,
            user_id,
            status,
            tier,
            current_period_end,
        } => {
            let mut patch = SubscriptionPatch::at(now).subscription_id(Some(subscription_id.clone()));
            if let Some(local) = status.local_status() {
                patch = patch.status(local);
            }
            if status.grants_tier() {
                patch = patch.tier(*tier);
            }
            if current_period_end.is_some() {
                patch = patch.end_date(*current_period_end);
            }
            let target = match user_id {
                Some(user_id) => Target::User(user_id.clone()),
                None => Target::Subscription(subscription_id.clone()),
            };
            Some(Transition {
                target,
                patch,
                create_if_missing: false,
            })
        }
        BillingEvent::SubscriptionDeleted { subscription_id } => Some(Transition {
            target: Target::Subscription(subscription_id.clone()),
            patch: SubscriptionPatch::at(now)
                .status(SubscriptionStatus::Cancelled)
                .end_date(Some(now))
                .tier(Tier::Free),
            create_if_missing: false,
        }),
        BillingEvent::PaymentFailed { subscription_id } => Some(Transition {
            target: Target::Subscription(subscription_id.clone()?),
            patch: SubscriptionPatch::at(now).status(SubscriptionStatus::Expired),
            create_if_missing: false,
        }),
        BillingEvent::PaymentSucceeded { subscription_id } => Some(Transition {
            target: Target::Subscription(subscription_id.clone()?),
            patch: SubscriptionPatch::at(now).status(SubscriptionStatus::Active),
            create_if_missing: false,
        }),
        BillingEvent::Unhandled => None,
    }
}

enum Applied {
    Done,
    Unresolved,
    Stale,
}

impl BillingService {
    /// Ingest one webhook delivery.
    ///
    /// `Err` only for a verified body that is not JSON. Every other outcome,
    /// including signature failures and store errors, is an acknowledgement.
    pub async fn ingest_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, BillingError> {
        let now = self.clock.now();

        let Some(signature) = signature.filter(|s| !s.trim().is_empty()) else {
            warn!("webhook rejected: missing signature header");
            return Ok(WebhookAck::error(BillingError::WebhookSignatureMissing.ack_tag()));
        };

        if let Err(err) = verify_webhook_signature(
            payload,
            signature,
            &self.options.webhook_secret,
            now,
            self.options.signature_tolerance_secs,
        ) {
            warn!(code = err.code(), "webhook rejected: signature verification failed");
            return Ok(WebhookAck::error(err.ack_tag()));
        }

        let (event, raw) = match WebhookEvent::parse(payload) {
            Ok(parsed) => parsed,
            Err(BillingError::WebhookPayloadMalformed) => {
                return Err(BillingError::WebhookPayloadMalformed);
            }
            Err(err) => {
                warn!(code = err.code(), "webhook event lacks id or type");
                return Ok(WebhookAck::error(err.ack_tag()));
            }
        };

        let entry = WebhookEventEntry {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            source: EVENT_SOURCE.to_string(),
            payload: raw,
            received_at: now,
        };
        match self.store.record_webhook_event(entry).await {
            Ok(true) => {}
            Ok(false) => {
                info!(event_id = %event.id, event_type = %event.event_type, "duplicate webhook event ignored");
                return Ok(WebhookAck::duplicate());
            }
            Err(err) => {
                error!(event_id = %event.id, error = %err, "failed to record webhook event");
                return Ok(WebhookAck::error("processing_failed"));
            }
        }

        let decoded = decode_event(&event, &self.options.price_ids);
        let Some(transition) = transition(&decoded, now) else {
            info!(event_id = %event.id, event_type = %event.event_type, "webhook event not handled");
            return Ok(WebhookAck::ignored());
        };

        // Provider timestamps are whole seconds; keep the fallback comparable.
        let event_at = event.created_at().unwrap_or_else(|| now.trunc_subsecs(0));
        let patch = transition.patch.clone().webhook_event(event.event_type.clone(), event_at);

        match self.apply(&transition, patch, event_at, now).await {
            Ok(Applied::Done) => {
                info!(event_id = %event.id, event_type = %event.event_type, "webhook event applied");
                Ok(WebhookAck::applied())
            }
            Ok(Applied::Unresolved) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    target = ?transition.target,
                    "webhook event matches no subscription"
                );
                Ok(WebhookAck::ignored())
            }
            Ok(Applied::Stale) => {
                info!(event_id = %event.id, event_type = %event.event_type, "stale webhook event discarded");
                Ok(WebhookAck::stale())
            }
            Err(err) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "failed to apply webhook event"
                );
                Ok(WebhookAck::error("processing_failed"))
            }
        }
    }

    async fn apply(
        &self,
        transition: &Transition,
        patch: SubscriptionPatch,
        event_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Applied, SerenaError> {
        let user_id = match &transition.target {
            Target::User(user_id) => user_id.clone(),
            Target::Subscription(subscription_id) => {
                match self.store.find_by_subscription_id(subscription_id).await? {
                    Some(record) => record.user_id,
                    None => return Ok(Applied::Unresolved),
                }
            }
        };

        match self.options.event_ordering {
            EventOrdering::ArrivalOrder if transition.create_if_missing => {
                self.store.upsert(&user_id, patch, now).await?;
                Ok(Applied::Done)
            }
            EventOrdering::ArrivalOrder => match self.store.update(&user_id, patch).await? {
                Some(_) => Ok(Applied::Done),
                None => Ok(Applied::Unresolved),
            },
            EventOrdering::ProviderTimestamp => {
                if transition.create_if_missing {
                    self.store.get_or_create(&user_id, now).await?;
                }
                if self.store.update_unless_newer(&user_id, patch, event_at).await?.is_some() {
                    return Ok(Applied::Done);
                }
                if self.store.find(&user_id).await?.is_some() {
                    debug!(user_id = %user_id, %event_at, "event older than last applied");
                    Ok(Applied::Stale)
                } else {
                    Ok(Applied::Unresolved)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::webhook::ProviderStatus;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0).unwrap()
    }

    #[test]
    fn checkout_without_user_changes_nothing() {
        let event = BillingEvent::CheckoutCompleted {
            user_id: None,
            tier: Tier::Basic,
            customer_id: Some("cus_1".into()),
            subscription_id: Some("sub_1".into()),
        };
        assert!(transition(&event, now()).is_none());
    }

    #[test]
    fn checkout_activates_web_subscription() {
        let event = BillingEvent::CheckoutCompleted {
            user_id: Some("u1".into()),
            tier: Tier::Basic,
            customer_id: Some("cus_1".into()),
            subscription_id: Some("sub_1".into()),
        };
        let t = transition(&event, now()).unwrap();
        assert_eq!(t.target, Target::User("u1".into()));
        assert!(t.create_if_missing);
        assert_eq!(t.patch.tier, Some(Tier::Basic));
        assert_eq!(t.patch.status, Some(SubscriptionStatus::Active));
        assert_eq!(t.patch.subscription_source, Some(Some(SubscriptionSource::Web)));
        assert_eq!(t.patch.subscription_start_date, Some(Some(now())));
        assert_eq!(t.patch.subscription_end_date, Some(None));
    }

    #[test]
    fn provider_status_drives_local_status() {
        let cases = [
            (ProviderStatus::Active, Some(SubscriptionStatus::Active), Some(Tier::Premium)),
            (ProviderStatus::Canceled, Some(SubscriptionStatus::Cancelled), None),
            (ProviderStatus::PastDue, Some(SubscriptionStatus::Expired), None),
            (ProviderStatus::Trialing, Some(SubscriptionStatus::Trial), Some(Tier::Premium)),
            (ProviderStatus::Incomplete, None, None),
        ];
        for (status, expected_status, expected_tier) in cases {
            let event = BillingEvent::SubscriptionChanged {
                subscription_id: "sub_1".into(),
                user_id: None,
                status,
                tier: Tier::Premium,
                current_period_end: None,
            };
            let t = transition(&event, now()).unwrap();
            assert_eq!(t.target, Target::Subscription("sub_1".into()));
            assert_eq!(t.patch.status, expected_status, "{status:?}");
            assert_eq!(t.patch.tier, expected_tier, "{status:?}");
            assert!(t.patch.subscription_end_date.is_none());
        }
    }

    #[test]
    fn deletion_downgrades_and_ends_now() {
        let event = BillingEvent::SubscriptionDeleted {
            subscription_id: "sub_1".into(),
        };
        let t = transition(&event, now()).unwrap();
        assert_eq!(t.patch.status, Some(SubscriptionStatus::Cancelled));
        assert_eq!(t.patch.tier, Some(Tier::Free));
        assert_eq!(t.patch.subscription_end_date, Some(Some(now())));
    }

    #[test]
    fn invoices_without_subscription_change_nothing() {
        assert!(transition(&BillingEvent::PaymentFailed { subscription_id: None }, now()).is_none());
        let t = transition(
            &BillingEvent::PaymentFailed {
                subscription_id: Some("sub_1".into()),
            },
            now(),
        )
        .unwrap();
        assert_eq!(t.patch.status, Some(SubscriptionStatus::Expired));
    }
}
