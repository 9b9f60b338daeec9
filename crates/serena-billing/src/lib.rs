//! # serena-billing
//!
//! Subscription entitlements, usage metering and billing-provider
//! integration.
//!
//! ## Operations
//! - `evaluate` / `check`: entitlement decision for a feature
//! - `increment` / `run_metered`: monthly usage accounting
//! - `snapshot`: full entitlement view, creating a FREE record on first use
//! - `create_checkout` / `create_portal_session` / `cancel`: provider glue
//! - `ingest_webhook`: signed provider events applied to subscription records

pub mod checkout;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod ingest;
pub mod provider;
pub mod schema;
pub mod status;
pub mod types;
pub mod usage;
pub mod webhook;

use std::sync::Arc;

use serena_core::{BillingOptions, Clock, SubscriptionStore, SystemClock};

pub use config::tier_for_price;
pub use error::BillingError;
pub use provider::{BillingProvider, CheckoutParams, ProviderError, ProviderSubscription, StripeClient};
pub use types::*;

/// Entry point for every billing operation.
///
/// Holds no mutable state of its own; all state lives in the store.
#[derive(Debug, Clone)]
pub struct BillingService {
    options: BillingOptions,
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
    clock: Arc<dyn Clock>,
}

impl BillingService {
    pub fn new(
        options: BillingOptions,
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn BillingProvider>,
    ) -> Self {
        Self {
            options,
            store,
            provider,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &BillingOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }
}
