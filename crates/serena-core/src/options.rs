// Configuration loaded from environment variables or a `serena.toml` file.
//
// Secrets are required up front: a missing billing key or webhook secret is a
// startup error, never a request-time one.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SerenaError};
use crate::policy::Tier;

/// How webhook events for the same subscription are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrdering {
    /// Last write wins in delivery order.
    #[default]
    ArrivalOrder,
    /// Events older (by provider timestamp) than the last applied one are
    /// logged but not applied.
    ProviderTimestamp,
}

/// Provider price identifiers for the paid tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceIds {
    #[serde(default = "default_basic_price")]
    pub basic: String,
    #[serde(default = "default_premium_price")]
    pub premium: String,
}

fn default_basic_price() -> String { "price_basic_monthly".to_string() }
fn default_premium_price() -> String { "price_premium_monthly".to_string() }

impl Default for PriceIds {
    fn default() -> Self {
        Self {
            basic: default_basic_price(),
            premium: default_premium_price(),
        }
    }
}

impl PriceIds {
    /// Price to check out for a paid tier. FREE has no price.
    pub fn for_tier(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Free => None,
            Tier::Basic => Some(&self.basic),
            Tier::Premium => Some(&self.premium),
        }
    }
}

/// Billing provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingOptions {
    /// Provider secret API key.
    pub secret_key: String,
    /// Webhook signing secret.
    pub webhook_secret: String,
    #[serde(default)]
    pub price_ids: PriceIds,
    /// Public URL of the web app, used to build default redirect URLs.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    /// Base URL of the provider REST API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Maximum age of a webhook signature timestamp. 0 disables the check.
    #[serde(default = "default_tolerance")]
    pub signature_tolerance_secs: u64,
    #[serde(default)]
    pub event_ordering: EventOrdering,
}

fn default_app_url() -> String { "http://localhost:5173".to_string() }
fn default_api_base() -> String { "https://api.stripe.com/v1".to_string() }
fn default_tolerance() -> u64 { 300 }

impl BillingOptions {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            price_ids: PriceIds::default(),
            app_url: default_app_url(),
            success_url: None,
            cancel_url: None,
            return_url: None,
            api_base: default_api_base(),
            signature_tolerance_secs: default_tolerance(),
            event_ordering: EventOrdering::default(),
        }
    }

    pub fn default_success_url(&self) -> String {
        self.success_url
            .clone()
            .unwrap_or_else(|| format!("{}/suscripcion?success=true", self.app_url))
    }

    pub fn default_cancel_url(&self) -> String {
        self.cancel_url
            .clone()
            .unwrap_or_else(|| format!("{}/suscripcion?canceled=true", self.app_url))
    }

    pub fn default_return_url(&self) -> String {
        self.return_url
            .clone()
            .unwrap_or_else(|| format!("{}/suscripcion", self.app_url))
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret_key.trim().is_empty() {
            return Err(SerenaError::Config("billing secret key is empty".into()));
        }
        if self.webhook_secret.trim().is_empty() {
            return Err(SerenaError::Config("webhook signing secret is empty".into()));
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// SQLx connection URL. `None` selects the in-memory store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// HS256 secret used to verify bearer tokens issued by the identity provider.
    pub jwt_secret: String,
}

fn default_bind_addr() -> String { "0.0.0.0:8080".to_string() }

/// Complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerenaOptions {
    pub server: ServerOptions,
    pub billing: BillingOptions,
}

impl SerenaOptions {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self> {
        let secret_key = required_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = required_env("STRIPE_WEBHOOK_SECRET")?;
        let jwt_secret = required_env("SERENA_JWT_SECRET")?;

        let mut billing = BillingOptions::new(secret_key, webhook_secret);
        if let Ok(price) = std::env::var("STRIPE_PRICE_ID_BASIC") {
            billing.price_ids.basic = price;
        }
        if let Ok(price) = std::env::var("STRIPE_PRICE_ID_PREMIUM") {
            billing.price_ids.premium = price;
        }
        if let Ok(url) = std::env::var("SERENA_APP_URL") {
            billing.app_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(base) = std::env::var("STRIPE_API_BASE") {
            billing.api_base = base;
        }
        if let Ok(raw) = std::env::var("STRIPE_SIGNATURE_TOLERANCE_SECS") {
            billing.signature_tolerance_secs = raw.parse().map_err(|_| {
                SerenaError::Config(format!("STRIPE_SIGNATURE_TOLERANCE_SECS is not a number: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var("SERENA_EVENT_ORDERING") {
            billing.event_ordering = match raw.as_str() {
                "arrival_order" => EventOrdering::ArrivalOrder,
                "provider_timestamp" => EventOrdering::ProviderTimestamp,
                other => {
                    return Err(SerenaError::Config(format!("unknown event ordering: {other}")))
                }
            };
        }

        let server = ServerOptions {
            bind_addr: std::env::var("SERENA_BIND_ADDR").unwrap_or_else(|_| default_bind_addr()),
            database_url: std::env::var("SERENA_DATABASE_URL").ok(),
            jwt_secret,
        };

        let options = Self { server, billing };
        options.billing.validate()?;
        Ok(options)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let options: Self = toml::from_str(raw)
            .map_err(|e| SerenaError::Config(format!("invalid configuration: {e}")))?;
        options.billing.validate()?;
        Ok(options)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SerenaError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SerenaError::Config(format!("{name} is not set")))
}
