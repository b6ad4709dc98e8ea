//! Route guards for session identity.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{SessionAuthenticator, require_identity};
use crate::error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Verifies the session credential and attaches the identity.
///
/// A failed verification answers the request on the spot; nothing further
/// down the chain runs.
pub struct VerifyIdentity {
    auth: Arc<SessionAuthenticator>,
}

impl VerifyIdentity {
    pub fn new(auth: Arc<SessionAuthenticator>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl Middleware for VerifyIdentity {
    async fn handle(&self, mut req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let identity = self.auth.verify_identity(req.session())?;
        req.attach_identity(identity)?;
        Ok(next.run(req).await)
    }
}

/// Refuses requests without an attached identity.
pub struct RequireIdentity;

#[async_trait]
impl Middleware for RequireIdentity {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        require_identity(&req)?;
        Ok(next.run(req).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Layer;
    use crate::router::Router;
    use crate::handler::Endpoint;
    use http::{Method, StatusCode};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;

    async fn whoami(req: Request) -> Response {
        let sub = req.identity().and_then(|i| i.subject()).unwrap_or("anonymous");
        Response::text(sub.to_owned())
    }

    fn router() -> Router {
        let auth = Arc::new(SessionAuthenticator::new(&SecretString::from("secret")));
        let verify: Layer = Arc::new(VerifyIdentity::new(auth));
        let require: Layer = Arc::new(RequireIdentity);
        Router::new()
            .guarded(Method::GET, "/protected", vec![verify, Arc::clone(&require)], whoami)
            .guarded(Method::GET, "/require-only", vec![require], whoami)
    }

    #[tokio::test]
    async fn verification_failure_short_circuits() {
        let res = router().call(Request::for_test(Method::GET, "/protected")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_without_verify_is_bad_request() {
        let res = router().call(Request::for_test(Method::GET, "/require-only")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verified_identity_reaches_handler() {
        let token = encode(
            &Header::default(),
            &serde_json::json!({ "sub": "u1" }),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let req = Request::for_test(Method::GET, "/protected");
        req.session().set_jwt(token);

        let res = router().call(req).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"u1");
    }
}
