//! Checkout, billing portal and cancellation.

use serena_core::error::Result;
use serena_core::{
    ApiError, ErrorCode, HttpStatus, Principal, SubscriptionPatch, SubscriptionSource,
    SubscriptionStatus,
};
use tracing::{error, info, warn};

use crate::error::BillingError;
use crate::provider::CheckoutParams;
use crate::types::{CancelOutcome, CheckoutRequest, CheckoutSession, PortalSession};
use crate::BillingService;

const CANCELLED_MESSAGE: &str =
    "Subscription cancelled. You keep access until the end of the current billing period.";
const MOBILE_MESSAGE: &str =
    "This subscription was purchased in the mobile app. Cancel it from the App Store or Google Play.";

impl BillingService {
    /// Open a hosted checkout for a paid tier, creating the provider
    /// customer on first use.
    pub async fn create_checkout(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession> {
        let price_id = self
            .options
            .price_ids
            .for_tier(request.tier)
            .ok_or(BillingError::TierNotPurchasable)?
            .to_string();

        let now = self.clock.now();
        let record = self.store.get_or_create(&principal.user_id, now).await?;

        let customer_id = match record.stripe_customer_id {
            Some(id) => id,
            None => {
                let id = self
                    .provider
                    .create_customer(&principal.user_id, principal.email.as_deref())
                    .await
                    .map_err(|e| {
                        error!(user_id = %principal.user_id, error = %e, "customer creation failed");
                        BillingError::CustomerCreateFailed
                    })?;
                self.store
                    .update(
                        &principal.user_id,
                        SubscriptionPatch::at(now).customer_id(Some(id.clone())),
                    )
                    .await?;
                info!(user_id = %principal.user_id, customer_id = %id, "billing customer created");
                id
            }
        };

        let params = CheckoutParams {
            customer_id,
            price_id,
            user_id: principal.user_id.clone(),
            email: principal.email.clone(),
            tier: request.tier,
            success_url: request
                .success_url
                .unwrap_or_else(|| self.options.default_success_url()),
            cancel_url: request
                .cancel_url
                .unwrap_or_else(|| self.options.default_cancel_url()),
        };

        let session = self
            .provider
            .create_checkout_session(&params)
            .await
            .map_err(|e| {
                error!(user_id = %principal.user_id, error = %e, "checkout session failed");
                BillingError::CheckoutFailed
            })?;

        info!(
            user_id = %principal.user_id,
            tier = %request.tier,
            session_id = %session.session_id,
            "checkout session created"
        );
        Ok(session)
    }

    /// Open the self-service billing portal for an existing customer.
    pub async fn create_portal_session(
        &self,
        principal: &Principal,
        return_url: Option<String>,
    ) -> Result<PortalSession> {
        let customer_id = self
            .store
            .find(&principal.user_id)
            .await?
            .and_then(|record| record.stripe_customer_id)
            .ok_or_else(|| ApiError::not_found("No billing customer found for this user"))?;

        let return_url = return_url.unwrap_or_else(|| self.options.default_return_url());
        let url = self
            .provider
            .create_portal_session(&customer_id, &return_url)
            .await
            .map_err(|e| {
                error!(user_id = %principal.user_id, error = %e, "portal session failed");
                BillingError::PortalFailed
            })?;

        Ok(PortalSession { url })
    }

    /// Cancel a web subscription at the end of its paid period.
    ///
    /// Mobile subscriptions are rejected before any provider call.
    pub async fn cancel(&self, principal: &Principal) -> Result<CancelOutcome> {
        let record = self
            .store
            .find(&principal.user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Subscription not found"))?;

        match record.subscription_source {
            Some(SubscriptionSource::Web) => {}
            Some(SubscriptionSource::Mobile) => {
                info!(user_id = %principal.user_id, "cancel refused for mobile subscription");
                return Err(ApiError::with_message(
                    HttpStatus::BadRequest,
                    ErrorCode::MobileSubscription,
                    MOBILE_MESSAGE,
                )
                .into());
            }
            None => return Err(ApiError::not_found("No web subscription to cancel").into()),
        }

        let existing_end = record.subscription_end_date;
        let subscription_id = record
            .stripe_subscription_id
            .ok_or_else(|| ApiError::not_found("No active billing subscription"))?;

        let cancelled = self
            .provider
            .cancel_at_period_end(&subscription_id)
            .await
            .map_err(|e| {
                error!(user_id = %principal.user_id, error = %e, "cancellation failed");
                BillingError::CancelFailed
            })?;

        // Access continues until the period end. Without a known end date the
        // status stays as it is, and the deletion event at period end closes
        // the subscription.
        let now = self.clock.now();
        let end_date = cancelled
            .current_period_end
            .or(existing_end.filter(|end| *end > now));
        match end_date {
            Some(end) => {
                let patch = SubscriptionPatch::at(now)
                    .status(SubscriptionStatus::Cancelled)
                    .end_date(Some(end));
                if let Err(e) = self.store.update(&principal.user_id, patch).await {
                    // The provider has already scheduled the cancellation. The
                    // record keeps its current status until the deletion event.
                    error!(user_id = %principal.user_id, error = %e, "failed to record cancellation");
                }
            }
            None => warn!(
                user_id = %principal.user_id,
                subscription_id = %subscription_id,
                "provider reported no period end, status left unchanged"
            ),
        }

        info!(
            user_id = %principal.user_id,
            subscription_id = %subscription_id,
            end_date = ?end_date,
            "subscription cancelled at period end"
        );
        Ok(CancelOutcome {
            success: true,
            message: CANCELLED_MESSAGE.to_string(),
            end_date,
        })
    }
}
