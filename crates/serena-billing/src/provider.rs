// Billing provider seam and the HTTP client for the provider's REST API.
//
// Calls are never retried here. A failure surfaces to the caller, who may
// repeat the whole user action.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serena_core::{BillingOptions, Tier};

use crate::types::CheckoutSession;

/// Errors talking to the billing provider. Bodies are for logs only.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to billing provider failed: {0}")]
    Transport(String),

    #[error("billing provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected billing provider response: {0}")]
    Decode(String),
}

/// Everything needed to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutParams {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub success_url: String,
    pub cancel_url: String,
}

/// Provider view of a subscription after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync + fmt::Debug {
    /// Create a customer tagged with the user id. Returns the customer id.
    async fn create_customer(&self, user_id: &str, email: Option<&str>) -> Result<String, ProviderError>;

    async fn create_checkout_session(&self, params: &CheckoutParams) -> Result<CheckoutSession, ProviderError>;

    /// Open a self-service portal session. Returns its URL.
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, ProviderError>;

    /// Schedule cancellation at the end of the paid period.
    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<ProviderSubscription, ProviderError>;
}

/// Form-encoded REST client for the provider API.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct IdAndUrl {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: Option<SubscriptionItems>,
}

#[derive(Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    #[serde(default)]
    current_period_end: Option<i64>,
}

impl StripeClient {
    pub fn new(options: &BillingOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: options.api_base.trim_end_matches('/').to_string(),
            secret_key: options.secret_key.clone(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, user_id: &str, email: Option<&str>) -> Result<String, ProviderError> {
        let form = [
            ("email", email.unwrap_or_default().to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        let customer: IdAndUrl = self.post_form("/customers", &form).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(&self, params: &CheckoutParams) -> Result<CheckoutSession, ProviderError> {
        let tier = params.tier.as_str().to_string();
        let email = params.email.clone().unwrap_or_default();
        let form = [
            ("customer", params.customer_id.clone()),
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", params.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", params.success_url.clone()),
            ("cancel_url", params.cancel_url.clone()),
            ("metadata[user_id]", params.user_id.clone()),
            ("metadata[tier]", tier.clone()),
            ("subscription_data[metadata][user_id]", params.user_id.clone()),
            ("subscription_data[metadata][tier]", tier),
            ("subscription_data[metadata][email]", email),
        ];
        let session: IdAndUrl = self.post_form("/checkout/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| ProviderError::Decode("checkout session has no url".into()))?;
        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, ProviderError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];
        let session: IdAndUrl = self.post_form("/billing_portal/sessions", &form).await?;
        session
            .url
            .ok_or_else(|| ProviderError::Decode("portal session has no url".into()))
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<ProviderSubscription, ProviderError> {
        let form = [("cancel_at_period_end", "true".to_string())];
        let sub: SubscriptionObject = self
            .post_form(&format!("/subscriptions/{subscription_id}"), &form)
            .await?;

        // Newer API versions report the period end per item.
        let period_end = sub.current_period_end.or_else(|| {
            sub.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        });
        Ok(ProviderSubscription {
            id: sub.id,
            current_period_end: period_end.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let client = StripeClient::new(&BillingOptions::new("sk_live_secret", "whsec"));
        let debug = format!("{client:?}");
        assert!(debug.contains("api.stripe.com"));
        assert!(!debug.contains("sk_live_secret"));
    }

    #[test]
    fn subscription_period_end_falls_back_to_items() {
        let raw = serde_json::json!({
            "id": "sub_1",
            "items": {"data": [{"current_period_end": 1_700_000_000}]}
        });
        let sub: SubscriptionObject = serde_json::from_value(raw).unwrap();
        assert!(sub.current_period_end.is_none());
        assert_eq!(sub.items.unwrap().data[0].current_period_end, Some(1_700_000_000));
    }
}
