//! Checkout, portal and cancellation flows against the recording provider.

mod common;

use chrono::Duration;
use common::{t, user, Harness};
use serena_billing::CheckoutRequest;
use serena_core::{ErrorCode, Feature, SubscriptionSource, SubscriptionStatus, Tier};
use serena_test_utils::fixtures::{record, web_record, BASIC_PRICE, PREMIUM_PRICE};
use serena_test_utils::{MockBillingProvider, ProviderCall};

fn request(tier: Tier) -> CheckoutRequest {
    CheckoutRequest {
        tier,
        success_url: None,
        cancel_url: None,
    }
}

// ── Checkout ────────────────────────────────────────────────────

#[tokio::test]
async fn first_checkout_creates_customer_and_session() {
    let h = Harness::new(t(2025, 7, 1, 10));
    let session = h
        .service
        .create_checkout(&user("alice"), request(Tier::Basic))
        .await
        .unwrap();
    assert!(session.url.starts_with("https://checkout.example.test/"));

    let calls = h.provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        ProviderCall::CreateCustomer {
            user_id: "alice".into(),
            email: Some("alice@example.com".into()),
        }
    );
    let ProviderCall::CreateCheckout(params) = &calls[1] else {
        panic!("expected checkout call, got {:?}", calls[1]);
    };
    assert_eq!(params.price_id, BASIC_PRICE);
    assert_eq!(params.tier, Tier::Basic);
    assert_eq!(params.success_url, "http://localhost:5173/suscripcion?success=true");
    assert_eq!(params.cancel_url, "http://localhost:5173/suscripcion?canceled=true");

    let rec = h.record("alice").await;
    assert_eq!(rec.stripe_customer_id.as_deref(), Some(params.customer_id.as_str()));
    // Tier only changes once the checkout webhook arrives.
    assert_eq!(rec.tier, Tier::Free);
}

#[tokio::test]
async fn existing_customer_is_reused() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.seed(web_record("bob", Tier::Basic, "cus_existing", "sub_1", h.now())).await;

    let mut req = request(Tier::Premium);
    req.success_url = Some("https://app.example/done".into());
    h.service.create_checkout(&user("bob"), req).await.unwrap();

    let calls = h.provider.calls();
    assert_eq!(calls.len(), 1);
    let ProviderCall::CreateCheckout(params) = &calls[0] else {
        panic!("expected checkout call, got {:?}", calls[0]);
    };
    assert_eq!(params.customer_id, "cus_existing");
    assert_eq!(params.price_id, PREMIUM_PRICE);
    assert_eq!(params.success_url, "https://app.example/done");
}

#[tokio::test]
async fn free_tier_cannot_be_bought() {
    let h = Harness::new(t(2025, 7, 1, 10));
    let err = h
        .service
        .create_checkout(&user("alice"), request(Tier::Free))
        .await
        .unwrap_err()
        .into_api_error();
    assert_eq!(err.status.status_code(), 400);
    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn provider_failures_map_to_error_codes() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.provider.fail_customer(true);
    let err = h
        .service
        .create_checkout(&user("alice"), request(Tier::Basic))
        .await
        .unwrap_err()
        .into_api_error();
    assert_eq!(err.status.status_code(), 500);
    assert_eq!(err.code, ErrorCode::CustomerCreateFailed);

    h.provider.fail_customer(false);
    h.provider.fail_checkout(true);
    let err = h
        .service
        .create_checkout(&user("alice"), request(Tier::Basic))
        .await
        .unwrap_err()
        .into_api_error();
    assert_eq!(err.code, ErrorCode::CheckoutCreateFailed);
}

// ── Portal ──────────────────────────────────────────────────────

#[tokio::test]
async fn portal_requires_customer() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.seed(record("alice", Tier::Free, h.now())).await;
    let err = h
        .service
        .create_portal_session(&user("alice"), None)
        .await
        .unwrap_err()
        .into_api_error();
    assert_eq!(err.status.status_code(), 404);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn portal_uses_default_return_url() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.seed(web_record("bob", Tier::Basic, "cus_1", "sub_1", h.now())).await;
    let session = h.service.create_portal_session(&user("bob"), None).await.unwrap();
    assert!(session.url.starts_with("https://billing.example.test/"));
    assert_eq!(
        h.provider.calls(),
        vec![ProviderCall::CreatePortal {
            customer_id: "cus_1".into(),
            return_url: "http://localhost:5173/suscripcion".into(),
        }]
    );
}

// ── Cancel ──────────────────────────────────────────────────────

#[tokio::test]
async fn web_subscription_cancels_at_period_end() {
    let now = t(2025, 7, 1, 10);
    let period_end = now + Duration::days(20);
    let h = Harness::with_provider(now, MockBillingProvider::new().with_period_end(period_end));
    h.seed(web_record("bob", Tier::Premium, "cus_1", "sub_1", now)).await;

    let outcome = h.service.cancel(&user("bob")).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.end_date, Some(period_end));
    assert_eq!(
        h.provider.calls(),
        vec![ProviderCall::CancelAtPeriodEnd {
            subscription_id: "sub_1".into()
        }]
    );

    let rec = h.record("bob").await;
    assert_eq!(rec.status, SubscriptionStatus::Cancelled);
    assert_eq!(rec.subscription_end_date, Some(period_end));
    assert_eq!(rec.tier, Tier::Premium);
}

#[tokio::test]
async fn mobile_subscription_cannot_be_cancelled_here() {
    let h = Harness::new(t(2025, 7, 1, 10));
    let mut rec = record("mia", Tier::Premium, h.now());
    rec.subscription_source = Some(SubscriptionSource::Mobile);
    h.seed(rec.clone()).await;

    let err = h
        .service
        .cancel(&user("mia"))
        .await
        .unwrap_err()
        .into_api_error();
    assert_eq!(err.status.status_code(), 400);
    assert_eq!(err.code, ErrorCode::MobileSubscription);
    assert_eq!(h.provider.call_count(), 0);
    assert_eq!(h.record("mia").await, rec);
}

#[tokio::test]
async fn cancel_without_subscription_is_not_found() {
    let h = Harness::new(t(2025, 7, 1, 10));
    let missing = h.service.cancel(&user("nobody")).await.unwrap_err().into_api_error();
    assert_eq!(missing.code, ErrorCode::NotFound);

    h.seed(record("alice", Tier::Free, h.now())).await;
    let no_source = h.service.cancel(&user("alice")).await.unwrap_err().into_api_error();
    assert_eq!(no_source.code, ErrorCode::NotFound);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn provider_cancel_failure_leaves_record_untouched() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.seed(web_record("bob", Tier::Basic, "cus_1", "sub_1", h.now())).await;
    h.provider.fail_cancel(true);

    let err = h.service.cancel(&user("bob")).await.unwrap_err().into_api_error();
    assert_eq!(err.status.status_code(), 500);
    assert_eq!(err.code, ErrorCode::CancelFailed);
    assert_eq!(h.record("bob").await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancel_without_provider_period_end_keeps_stored_end_date() {
    let now = t(2025, 7, 1, 10);
    let h = Harness::new(now);
    let period_end = now + Duration::days(12);
    let mut rec = web_record("bob", Tier::Basic, "cus_1", "sub_1", now);
    rec.subscription_end_date = Some(period_end);
    h.seed(rec).await;

    let outcome = h.service.cancel(&user("bob")).await.unwrap();
    assert_eq!(outcome.end_date, Some(period_end));

    let rec = h.record("bob").await;
    assert_eq!(rec.status, SubscriptionStatus::Cancelled);
    assert_eq!(rec.subscription_end_date, Some(period_end));
    let decision = h.service.check(&user("bob"), Feature::BreathingFull).await.unwrap();
    assert!(decision.allowed);
}

#[tokio::test]
async fn cancel_without_any_end_date_keeps_access() {
    let h = Harness::new(t(2025, 7, 1, 10));
    h.seed(web_record("bob", Tier::Basic, "cus_1", "sub_1", h.now())).await;

    let outcome = h.service.cancel(&user("bob")).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.end_date, None);
    assert_eq!(h.provider.call_count(), 1);

    let rec = h.record("bob").await;
    assert_eq!(rec.status, SubscriptionStatus::Active);
    assert!(rec.subscription_end_date.is_none());
    let decision = h.service.check(&user("bob"), Feature::BreathingFull).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.current_tier, Tier::Basic);
}
