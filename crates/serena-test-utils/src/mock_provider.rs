//! Recording billing provider.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serena_billing::{
    BillingProvider, CheckoutParams, CheckoutSession, ProviderError, ProviderSubscription,
};

/// One call made against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateCustomer { user_id: String, email: Option<String> },
    CreateCheckout(CheckoutParams),
    CreatePortal { customer_id: String, return_url: String },
    CancelAtPeriodEnd { subscription_id: String },
}

/// Billing provider that records every call and answers with canned data.
#[derive(Debug, Default)]
pub struct MockBillingProvider {
    calls: Mutex<Vec<ProviderCall>>,
    next_id: AtomicUsize,
    fail_customer: AtomicBool,
    fail_checkout: AtomicBool,
    fail_portal: AtomicBool,
    fail_cancel: AtomicBool,
    period_end: Mutex<Option<DateTime<Utc>>>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Period end reported by `cancel_at_period_end`.
    pub fn with_period_end(self, end: DateTime<Utc>) -> Self {
        *self.period_end.lock().unwrap_or_else(|e| e.into_inner()) = Some(end);
        self
    }

    pub fn fail_customer(&self, fail: bool) {
        self.fail_customer.store(fail, Ordering::SeqCst);
    }

    pub fn fail_checkout(&self, fail: bool) {
        self.fail_checkout.store(fail, Ordering::SeqCst);
    }

    pub fn fail_portal(&self, fail: bool) {
        self.fail_portal.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}_mock_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn refused(what: &str) -> ProviderError {
        ProviderError::Api {
            status: 402,
            body: format!("{{\"error\":{{\"message\":\"{what} refused by mock\"}}}}"),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_customer(&self, user_id: &str, email: Option<&str>) -> Result<String, ProviderError> {
        self.record(ProviderCall::CreateCustomer {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
        });
        if self.fail_customer.load(Ordering::SeqCst) {
            return Err(Self::refused("customer"));
        }
        Ok(self.next("cus"))
    }

    async fn create_checkout_session(&self, params: &CheckoutParams) -> Result<CheckoutSession, ProviderError> {
        self.record(ProviderCall::CreateCheckout(params.clone()));
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(Self::refused("checkout"));
        }
        let session_id = self.next("cs");
        Ok(CheckoutSession {
            url: format!("https://checkout.example.test/{session_id}"),
            session_id,
        })
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, ProviderError> {
        self.record(ProviderCall::CreatePortal {
            customer_id: customer_id.to_string(),
            return_url: return_url.to_string(),
        });
        if self.fail_portal.load(Ordering::SeqCst) {
            return Err(Self::refused("portal"));
        }
        Ok(format!("https://billing.example.test/{}", self.next("bps")))
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<ProviderSubscription, ProviderError> {
        self.record(ProviderCall::CancelAtPeriodEnd {
            subscription_id: subscription_id.to_string(),
        });
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(Self::refused("cancel"));
        }
        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            current_period_end: *self.period_end.lock().unwrap_or_else(|e| e.into_inner()),
        })
    }
}
