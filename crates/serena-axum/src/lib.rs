// serena-axum: HTTP surface for Serena billing.
//
// Every route except `/stripe-webhook` and `/ok` requires an
// `Authorization: Bearer <token>` header. Denials from `/check-feature` are
// 200 responses; only transport-level problems become error statuses.

pub mod auth;
pub mod error;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use serena_billing::webhook::SIGNATURE_HEADER;
use serena_billing::{
    BillingService, CancelOutcome, CheckoutRequest, CheckoutSession, PortalSession,
    SubscriptionSnapshot, UsageIncrement, WebhookAck,
};
use serena_core::{CountableFeature, Principal, ReasonCode, Tier};

pub use auth::{extract_bearer, Authenticator, JwtAuthenticator, StaticAuthenticator};
pub use error::HttpError;

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub billing: BillingService,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    fn principal(&self, headers: &HeaderMap) -> Option<Principal> {
        extract_bearer(headers).and_then(|token| self.authenticator.authenticate(token))
    }

    fn require_principal(&self, headers: &HeaderMap) -> Result<Principal, HttpError> {
        self.principal(headers).ok_or_else(HttpError::unauthorized)
    }
}

// ─── Serena Builder ─────────────────────────────────────────────

/// Entry point for mounting the billing API on an Axum app.
///
/// ```rust,ignore
/// let serena = Serena::new(billing, Arc::new(JwtAuthenticator::new(&secret)));
/// let app = axum::Router::new().merge(serena.router_with_cors());
/// ```
pub struct Serena {
    state: Arc<AppState>,
    base_path: String,
}

impl Serena {
    pub const DEFAULT_BASE_PATH: &'static str = "/api";

    pub fn new(billing: BillingService, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            state: Arc::new(AppState {
                billing,
                authenticator,
            }),
            base_path: Self::DEFAULT_BASE_PATH.to_string(),
        }
    }

    /// Mount the routes under another prefix. `""` or `"/"` mounts at the root.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// All routes, with request tracing.
    pub fn router(&self) -> Router {
        let routes = self.routes();
        let base = self.base_path.trim_end_matches('/');
        let router = if base.is_empty() {
            routes
        } else {
            Router::new().nest(base, routes)
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// [`router`](Self::router) plus a permissive CORS layer, for browser
    /// clients served from another origin.
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        self.router().layer(cors)
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/ok", get(handle_ok))
            .route("/check-feature", post(handle_check_feature))
            .route("/increment-usage", post(handle_increment_usage))
            .route(
                "/subscription-status",
                get(handle_subscription_status).post(handle_subscription_status),
            )
            .route("/create-checkout", post(handle_create_checkout))
            .route("/customer-portal", post(handle_customer_portal))
            .route("/cancel-subscription", post(handle_cancel_subscription))
            .route("/stripe-webhook", post(handle_stripe_webhook))
            .with_state(self.state.clone())
    }
}

// ─── Request Types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CheckFeatureBody {
    #[serde(default)]
    feature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IncrementUsageBody {
    #[serde(default, rename = "type")]
    usage_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutBody {
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    success_url: Option<String>,
    #[serde(default)]
    cancel_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PortalBody {
    #[serde(default)]
    return_url: Option<String>,
}

/// Parse an optional JSON body. An empty body is `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|_| HttpError::bad_request("Request body must be a JSON object"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Route Handlers ─────────────────────────────────────────────

async fn handle_ok() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn handle_check_feature(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let Some(principal) = state.principal(&headers) else {
        let decision = state.billing.evaluate(None, "").await?;
        return Ok((StatusCode::UNAUTHORIZED, Json(decision)).into_response());
    };

    let request: CheckFeatureBody = parse_body(&body)?;
    let feature = non_empty(request.feature).ok_or_else(|| HttpError::bad_request("feature is required"))?;

    let decision = state.billing.evaluate(Some(&principal), &feature).await?;
    let status = if decision.reason == Some(ReasonCode::UnknownFeature) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(decision)).into_response())
}

async fn handle_increment_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UsageIncrement>, HttpError> {
    let principal = state.require_principal(&headers)?;
    let request: IncrementUsageBody = parse_body(&body)?;
    let counter = non_empty(request.usage_type)
        .and_then(|t| t.parse::<CountableFeature>().ok())
        .ok_or_else(|| HttpError::bad_request("Invalid usage type. Must be 'recipe' or 'audio'"))?;

    let result = state.billing.increment(&principal.user_id, counter).await?;
    Ok(Json(result))
}

async fn handle_subscription_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SubscriptionSnapshot>, HttpError> {
    let principal = state.require_principal(&headers)?;
    let snapshot = state.billing.snapshot(&principal).await?;
    Ok(Json(snapshot))
}

async fn handle_create_checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckoutSession>, HttpError> {
    let principal = state.require_principal(&headers)?;
    let request: CheckoutBody = parse_body(&body)?;
    let tier = non_empty(request.tier)
        .and_then(|t| t.parse::<Tier>().ok())
        .ok_or_else(|| HttpError::bad_request("Tier must be BASIC or PREMIUM"))?;

    let session = state
        .billing
        .create_checkout(
            &principal,
            CheckoutRequest {
                tier,
                success_url: non_empty(request.success_url),
                cancel_url: non_empty(request.cancel_url),
            },
        )
        .await?;
    Ok(Json(session))
}

async fn handle_customer_portal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PortalSession>, HttpError> {
    let principal = state.require_principal(&headers)?;
    let request: PortalBody = parse_body(&body)?;
    let session = state
        .billing
        .create_portal_session(&principal, non_empty(request.return_url))
        .await?;
    Ok(Json(session))
}

async fn handle_cancel_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CancelOutcome>, HttpError> {
    let principal = state.require_principal(&headers)?;
    let outcome = state.billing.cancel(&principal).await?;
    Ok(Json(outcome))
}

/// Unauthenticated; the signature header stands in for a token.
async fn handle_stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, HttpError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let ack = state.billing.ingest_webhook(&body, signature).await?;
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_defaults_on_empty() {
        let body: PortalBody = parse_body(b"  ").unwrap();
        assert!(body.return_url.is_none());
        assert!(parse_body::<PortalBody>(b"not json").is_err());
    }

    #[test]
    fn test_increment_body_reads_type_field() {
        let body: IncrementUsageBody = parse_body(br#"{"type":"audio"}"#).unwrap();
        assert_eq!(body.usage_type.as_deref(), Some("audio"));
    }
}
