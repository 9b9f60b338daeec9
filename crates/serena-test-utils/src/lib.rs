// serena-test-utils
//
// Shared test infrastructure:
// - `StoreTestSuite` runs the store contract against any `SubscriptionStore`
// - `MockBillingProvider` records provider calls and can be told to fail
// - `FixedClock` for deterministic dates
// - fixtures for records and signed webhook payloads

pub mod clock;
pub mod fixtures;
pub mod mock_provider;
pub mod store_suite;

pub use clock::FixedClock;
pub use mock_provider::{MockBillingProvider, ProviderCall};
pub use store_suite::StoreTestSuite;
