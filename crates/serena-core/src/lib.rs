//! # serena-core
//!
//! Shared building blocks for the Serena subscription backend: the tier
//! policy table, subscription records, the storage seam every backend
//! implements, the error taxonomy and environment/config loading.

pub mod clock;
pub mod db;
pub mod env;
pub mod error;
pub mod options;
pub mod period;
pub mod policy;

// Re-exports for convenience
pub use clock::{Clock, SystemClock};
pub use db::models::{
    Principal, SubscriptionRecord, SubscriptionSource, SubscriptionStatus, WebhookEventEntry,
};
pub use db::store::{SubscriptionPatch, SubscriptionStore};
pub use error::{ApiError, ErrorCode, HttpStatus, ReasonCode, SerenaError};
pub use options::{BillingOptions, EventOrdering, PriceIds, SerenaOptions, ServerOptions};
pub use policy::{Allowance, CountableFeature, Feature, Quota, Tier, TierLimits};
