// Error codes and error types shared by every Serena crate.
//
// Two families live here: `ErrorCode`/`ApiError` for failures surfaced at the
// HTTP boundary, and `ReasonCode` for entitlement denials, which are normal
// outcomes carried in a 200 body rather than errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire error codes returned in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotAuthenticated,
    InvalidRequest,
    UnknownFeature,
    NotFound,
    MobileSubscription,
    CustomerCreateFailed,
    CheckoutCreateFailed,
    PortalCreateFailed,
    CancelFailed,
    WebhookSignatureInvalid,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownFeature => "UNKNOWN_FEATURE",
            Self::NotFound => "NOT_FOUND",
            Self::MobileSubscription => "MOBILE_SUBSCRIPTION",
            Self::CustomerCreateFailed => "CUSTOMER_CREATE_FAILED",
            Self::CheckoutCreateFailed => "CHECKOUT_CREATE_FAILED",
            Self::PortalCreateFailed => "PORTAL_CREATE_FAILED",
            Self::CancelFailed => "CANCEL_FAILED",
            Self::WebhookSignatureInvalid => "WEBHOOK_SIGNATURE_INVALID",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotAuthenticated => "You must be signed in to use this feature",
            Self::InvalidRequest => "Invalid request",
            Self::UnknownFeature => "Unknown feature",
            Self::NotFound => "Subscription not found",
            Self::MobileSubscription => {
                "This subscription was purchased in the mobile app and must be managed from the app store"
            }
            Self::CustomerCreateFailed => "Could not create billing customer",
            Self::CheckoutCreateFailed => "Could not start checkout",
            Self::PortalCreateFailed => "Could not open the billing portal",
            Self::CancelFailed => "Could not cancel the subscription",
            Self::WebhookSignatureInvalid => "Webhook signature verification failed",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

/// Reason attached to a denied entitlement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NotAuthenticated,
    UnknownFeature,
    LimitReached,
    TierRequired,
    SubscriptionInactive,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::UnknownFeature => "UNKNOWN_FEATURE",
            Self::LimitReached => "LIMIT_REACHED",
            Self::TierRequired => "TIER_REQUIRED",
            Self::SubscriptionInactive => "SUBSCRIPTION_INACTIVE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status codes used by the API error system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn status_code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code())
    }
}

/// API error carrying an HTTP status, an error code, and a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    pub status: HttpStatus,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: HttpStatus, code: ErrorCode) -> Self {
        Self {
            message: code.to_string(),
            status,
            code,
        }
    }

    pub fn with_message(status: HttpStatus, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: ErrorCode) -> Self {
        Self::new(HttpStatus::BadRequest, code)
    }

    pub fn unauthorized() -> Self {
        Self::new(HttpStatus::Unauthorized, ErrorCode::NotAuthenticated)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(HttpStatus::NotFound, ErrorCode::NotFound, message)
    }

    pub fn internal(code: ErrorCode) -> Self {
        Self::new(HttpStatus::InternalServerError, code)
    }

    /// Build a JSON body for the error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": self.message,
        })
    }
}

/// Internal (non-HTTP) error: configuration problems, storage failures,
/// billing provider failures.
#[derive(Debug, thiserror::Error)]
pub enum SerenaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<serde_json::Error> for SerenaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl SerenaError {
    /// Map an internal error to what the caller is allowed to see.
    ///
    /// API errors pass through untouched; everything else collapses to a
    /// generic 500 so store and provider internals never leak.
    pub fn into_api_error(self) -> ApiError {
        match self {
            Self::Api(api) => api,
            _ => ApiError::internal(ErrorCode::InternalServerError),
        }
    }
}

/// Unified result type for Serena operations.
pub type Result<T> = std::result::Result<T, SerenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::CheckoutCreateFailed).unwrap();
        assert_eq!(json, "\"CHECKOUT_CREATE_FAILED\"");
        assert_eq!(ErrorCode::CheckoutCreateFailed.as_str(), "CHECKOUT_CREATE_FAILED");
    }

    #[test]
    fn reason_code_wire_names() {
        let json = serde_json::to_string(&ReasonCode::SubscriptionInactive).unwrap();
        assert_eq!(json, "\"SUBSCRIPTION_INACTIVE\"");
        assert_eq!(ReasonCode::LimitReached.to_string(), "LIMIT_REACHED");
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let err = SerenaError::Provider("stripe said: card_declined cus_123".into());
        let api = err.into_api_error();
        assert_eq!(api.status, HttpStatus::InternalServerError);
        assert!(!api.message.contains("cus_123"));
    }

    #[test]
    fn api_errors_pass_through() {
        let err = SerenaError::from(ApiError::not_found("no customer"));
        let api = err.into_api_error();
        assert_eq!(api.status.status_code(), 404);
        assert_eq!(api.to_json()["code"], "NOT_FOUND");
        assert_eq!(api.to_json()["message"], "no customer");
    }
}
