//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the place for
//! cross-cutting concerns: security headers, CORS, the session cookie,
//! compression, identity checks.
//!
//! Every layer implements the same process-or-forward contract: inspect or
//! modify the request, then either answer it (return a response or an
//! [`ApiError`]) or hand it to [`Next::run`] and decorate what comes back.
//! Layers are composed once at startup as an explicit ordered list:
//!
//! ```text
//! request ─► layer[0] ─► layer[1] ─► … ─► endpoint (router → guards → handler)
//! response ◄──────────────────────────────┘
//! ```
//!
//! An error returned by any layer or handler is rendered by
//! [`boundary`](crate::error::boundary) at the point it is returned, so
//! outer layers always receive a [`Response`] and can still decorate it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ApiError, boundary};
use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::Response;

mod auth;
mod body;
mod compression;
mod security;
mod session;

pub use auth::{RequireIdentity, VerifyIdentity};
pub use body::BodyParser;
pub use compression::Compression;
pub use security::{Cors, ParameterPollution, SecurityHeaders};
pub use session::SessionLayer;

/// One process-or-forward step of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError>;
}

/// A shared middleware instance, as stored in chains.
pub type Layer = Arc<dyn Middleware>;

/// The rest of the chain after the current layer.
pub struct Next<'a> {
    chain: &'a [Layer],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Layer], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the remaining layers and the endpoint.
    pub async fn run(self, req: Request) -> Response {
        match self.chain.split_first() {
            Some((layer, rest)) => layer
                .handle(req, Next { chain: rest, endpoint: self.endpoint })
                .await
                .unwrap_or_else(boundary),
            None => self.endpoint.call(req).await.unwrap_or_else(boundary),
        }
    }
}
