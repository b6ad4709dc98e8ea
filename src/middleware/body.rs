//! Request body checks.

use async_trait::async_trait;
use http::header::CONTENT_TYPE;

use crate::error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::{BodyRejection, Request};
use crate::response::Response;

/// Enforces the body limit and rejects malformed JSON before any handler
/// sees the request.
///
/// The body itself is collected by the pipeline up to the limit; this layer
/// turns an over-limit or unreadable body into an error at its place in the
/// chain, so layers installed before it still decorate the error response.
pub struct BodyParser;

#[async_trait]
impl Middleware for BodyParser {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        match req.rejected_body {
            Some(BodyRejection::TooLarge(limit)) => return Err(ApiError::PayloadTooLarge { limit }),
            Some(BodyRejection::Unreadable) => {
                return Err(ApiError::bad_request("request body could not be read", "body parser"));
            }
            None => {}
        }

        let is_json = req
            .header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"));
        if is_json && !req.body().is_empty() {
            req.json::<serde_json::Value>()?;
        }

        Ok(next.run(req).await)
    }
}
