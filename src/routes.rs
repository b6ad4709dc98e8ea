//! The gateway's own route table.
//!
//! Business routes belong to the downstream services; the gateway itself only
//! answers health probes and the current-identity endpoints.

use std::sync::Arc;

use http::Method;
use serde_json::json;
use tokio::sync::watch;

use crate::auth::{SessionAuthenticator, require_identity};
use crate::error::ApiError;
use crate::health;
use crate::middleware::{Layer, RequireIdentity, VerifyIdentity};
use crate::readiness::Readiness;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

pub const BASE_PATH: &str = "/api/gateway/v1";

pub fn router(auth: Arc<SessionAuthenticator>, readiness: watch::Receiver<Readiness>) -> Router {
    let verify: Layer = Arc::new(VerifyIdentity::new(auth));
    let require: Layer = Arc::new(RequireIdentity);

    Router::new()
        .get("/gateway-health", health::liveness)
        .get("/readyz", health::readiness(readiness))
        .guarded(
            Method::GET,
            &format!("{BASE_PATH}/auth/identity"),
            vec![Arc::clone(&verify), Arc::clone(&require)],
            current_identity,
        )
        .guarded(
            Method::POST,
            &format!("{BASE_PATH}/auth/signout"),
            vec![verify, require],
            sign_out,
        )
}

async fn current_identity(req: Request) -> Result<Response, ApiError> {
    let identity = require_identity(&req)?;
    Ok(Response::builder().json_value(&json!({
        "message": "Authenticated user",
        "user": identity,
    })))
}

async fn sign_out(req: Request) -> Response {
    req.session().clear();
    Response::builder().json_value(&json!({ "message": "Logout successful", "user": {} }))
}
