//! User-session authentication.
//!
//! Establishing identity and requiring it are two separate checks.
//! [`SessionAuthenticator::verify_identity`] turns the session's `jwt` into a
//! verified [`IdentityPayload`]; [`require_identity`] refuses requests that
//! carry none. Routes that support optional auth verify without requiring;
//! protected routes run both, in that order. The
//! [`VerifyIdentity`](crate::middleware::VerifyIdentity) and
//! [`RequireIdentity`](crate::middleware::RequireIdentity) guards wrap them.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::request::Request;
use crate::session::Session;

const TOKEN_UNAVAILABLE: &str = "Token is not available. Please login again.";
const AUTH_REQUIRED: &str = "Authentication is required to have access to this route";

/// The verified claim set of a Session Credential.
///
/// Whatever the issuer signed is kept as-is: `sub` or `id`, `iat`, username,
/// email, role info. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityPayload(Map<String, Value>);

impl IdentityPayload {
    pub fn claims(&self) -> &Map<String, Value> { &self.0 }

    pub fn claim(&self, name: &str) -> Option<&Value> { self.0.get(name) }

    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    pub fn issued_at(&self) -> Option<u64> {
        self.0.get("iat").and_then(Value::as_u64)
    }
}

/// Verifies HS256 Session Credentials against the user-session secret.
pub struct SessionAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl SessionAuthenticator {
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not demanded: credentials issued
        // without one stay valid until the signing secret changes.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Decodes and verifies the session's credential.
    ///
    /// Fails with [`ApiError::Unauthenticated`] when the session carries no
    /// `jwt`, or when the token is malformed, expired or signed with another
    /// secret.
    pub fn verify_identity(&self, session: &Session) -> Result<IdentityPayload, ApiError> {
        let Some(token) = session.jwt() else {
            return Err(ApiError::unauthenticated(
                TOKEN_UNAVAILABLE,
                "verify_identity: no session credential",
            ));
        };

        decode::<IdentityPayload>(&token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(reason = ?e.kind(), "session credential rejected");
                ApiError::unauthenticated(TOKEN_UNAVAILABLE, "verify_identity: invalid session credential")
            })
    }
}

/// Fails with [`ApiError::BadRequest`] unless an identity has been attached
/// to this request.
pub fn require_identity(req: &Request) -> Result<&IdentityPayload, ApiError> {
    req.identity()
        .ok_or_else(|| ApiError::bad_request(AUTH_REQUIRED, "require_identity"))
}
