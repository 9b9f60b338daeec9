// Bearer-token authentication.
//
// Handlers never see tokens: they ask an `Authenticator` to turn the
// `Authorization: Bearer ...` header into a `Principal`.

use std::collections::HashMap;
use std::fmt;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serena_core::{Principal, SerenaError};
use tracing::debug;

/// Resolves a bearer token to the caller it belongs to.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// `None` for an unknown, expired or malformed token.
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// JWT claims accepted by [`JwtAuthenticator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
}

/// HS256 JWTs signed with a shared secret. `sub` is the user id.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthenticator").finish_non_exhaustive()
    }
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `aud` is not checked.
        validation.validate_aud = false;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a token for `principal` valid until `expires_at`.
    pub fn issue(&self, principal: &Principal, expires_at: DateTime<Utc>) -> Result<String, SerenaError> {
        let claims = Claims {
            sub: principal.user_id.clone(),
            email: principal.email.clone(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SerenaError::Other(format!("failed to sign token: {e}")))
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(Principal {
                user_id: data.claims.sub,
                email: data.claims.email,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }
}

/// Fixed token → principal table. For tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("bearer  xyz ")), Some("xyz"));
        assert_eq!(extract_bearer(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(extract_bearer(&headers("Bearer ")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn test_jwt_round_trip() {
        let auth = JwtAuthenticator::new("jwt-secret");
        let principal = Principal::new("user-1").with_email("a@example.com");
        let token = auth.issue(&principal, Utc::now() + Duration::hours(1)).unwrap();
        assert_eq!(auth.authenticate(&token), Some(principal));
    }

    #[test]
    fn test_jwt_rejects_wrong_secret_and_expiry() {
        let issuer = JwtAuthenticator::new("one-secret");
        let verifier = JwtAuthenticator::new("other-secret");
        let principal = Principal::new("user-1");

        let token = issuer.issue(&principal, Utc::now() + Duration::hours(1)).unwrap();
        assert!(verifier.authenticate(&token).is_none());

        let expired = issuer.issue(&principal, Utc::now() - Duration::hours(1)).unwrap();
        assert!(issuer.authenticate(&expired).is_none());
        assert!(issuer.authenticate("not-a-jwt").is_none());
    }

    #[test]
    fn test_static_tokens() {
        let auth = StaticAuthenticator::new().with_token("t1", Principal::new("alice"));
        assert_eq!(auth.authenticate("t1").map(|p| p.user_id), Some("alice".into()));
        assert!(auth.authenticate("t2").is_none());
    }
}
