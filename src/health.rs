//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/gateway-health` | Is the process alive? |
//! | **Readiness** | `/readyz` | Has the search index been reached? |
//!
//! Readiness reads the state published by the
//! [`ReadinessGate`](crate::readiness::ReadinessGate); it never probes the
//! dependency itself.

use http::StatusCode;
use serde_json::json;
use tokio::sync::watch;

use crate::handler::Handler;
use crate::readiness::Readiness;
use crate::request::Request;
use crate::response::Response;

pub const LIVENESS_MESSAGE: &str = "API Gateway service is healthy and OK.";

/// Liveness probe. Always `200 OK`; if the process can answer, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::text(LIVENESS_MESSAGE)
}

/// Readiness probe bound to the gate's state channel.
///
/// `200 OK` with the last cluster status once the gate has opened,
/// `503 Service Unavailable` before.
pub fn readiness(state: watch::Receiver<Readiness>) -> impl Handler {
    move |_req: Request| {
        let current = state.borrow().clone();
        async move {
            let status = if current.ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
            Response::builder()
                .status(status)
                .json_value(&json!({ "ready": current.ready, "status": current.status }))
        }
    }
}
