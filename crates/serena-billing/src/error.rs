//! Billing and webhook error codes.

use serena_core::{ApiError, ErrorCode, HttpStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingError {
    WebhookSignatureMissing,
    WebhookSignatureInvalid,
    WebhookTimestampExpired,
    WebhookPayloadMalformed,
    WebhookEventInvalid,
    TierNotPurchasable,
    CustomerCreateFailed,
    CheckoutFailed,
    PortalFailed,
    CancelFailed,
}

impl BillingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WebhookSignatureMissing => "WEBHOOK_SIGNATURE_MISSING",
            Self::WebhookSignatureInvalid => "WEBHOOK_SIGNATURE_INVALID",
            Self::WebhookTimestampExpired => "WEBHOOK_TIMESTAMP_EXPIRED",
            Self::WebhookPayloadMalformed => "WEBHOOK_PAYLOAD_MALFORMED",
            Self::WebhookEventInvalid => "WEBHOOK_EVENT_INVALID",
            Self::TierNotPurchasable => "TIER_NOT_PURCHASABLE",
            Self::CustomerCreateFailed => "CUSTOMER_CREATE_FAILED",
            Self::CheckoutFailed => "CHECKOUT_CREATE_FAILED",
            Self::PortalFailed => "PORTAL_CREATE_FAILED",
            Self::CancelFailed => "CANCEL_FAILED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::WebhookSignatureMissing => "Webhook signature header is missing",
            Self::WebhookSignatureInvalid => "Webhook signature verification failed",
            Self::WebhookTimestampExpired => "Webhook signature timestamp is outside the tolerance window",
            Self::WebhookPayloadMalformed => "Webhook payload is not valid JSON",
            Self::WebhookEventInvalid => "Webhook event is missing its id or type",
            Self::TierNotPurchasable => "Tier must be BASIC or PREMIUM",
            Self::CustomerCreateFailed => "Failed to create billing customer",
            Self::CheckoutFailed => "Failed to create checkout session",
            Self::PortalFailed => "Failed to create portal session",
            Self::CancelFailed => "Failed to cancel subscription",
        }
    }

    /// Short tag used in webhook acknowledgements.
    pub fn ack_tag(&self) -> &'static str {
        match self {
            Self::WebhookSignatureMissing
            | Self::WebhookSignatureInvalid
            | Self::WebhookTimestampExpired => "invalid_signature",
            Self::WebhookPayloadMalformed => "malformed_payload",
            Self::WebhookEventInvalid => "invalid_event",
            _ => "processing_failed",
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::WebhookSignatureMissing
            | BillingError::WebhookSignatureInvalid
            | BillingError::WebhookTimestampExpired => {
                ApiError::bad_request(ErrorCode::WebhookSignatureInvalid)
            }
            BillingError::WebhookPayloadMalformed | BillingError::WebhookEventInvalid => {
                ApiError::with_message(HttpStatus::BadRequest, ErrorCode::InvalidRequest, err.message())
            }
            BillingError::TierNotPurchasable => {
                ApiError::with_message(HttpStatus::BadRequest, ErrorCode::InvalidRequest, err.message())
            }
            BillingError::CustomerCreateFailed => ApiError::internal(ErrorCode::CustomerCreateFailed),
            BillingError::CheckoutFailed => ApiError::internal(ErrorCode::CheckoutCreateFailed),
            BillingError::PortalFailed => ApiError::internal(ErrorCode::PortalCreateFailed),
            BillingError::CancelFailed => ApiError::internal(ErrorCode::CancelFailed),
        }
    }
}

impl From<BillingError> for serena_core::SerenaError {
    fn from(err: BillingError) -> Self {
        serena_core::SerenaError::Api(err.into())
    }
}
