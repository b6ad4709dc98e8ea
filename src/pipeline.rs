//! The assembled request pipeline.
//!
//! A [`Pipeline`] is the ordered global middleware list plus the route table
//! it ends in. The server hands every incoming request to
//! [`Pipeline::call`], which collects the body, runs the chain and converts
//! the result back into a hyper response. Nothing in here can fail the
//! connection: every error has already been rendered by the boundary.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::debug;

use crate::handler::Handler;
use crate::middleware::{Layer, Middleware, Next};
use crate::request::{BodyRejection, Request};
use crate::router::Router;

/// Default body limit: 200 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 200 * 1024 * 1024;

/// Global middleware, in order, followed by the route table.
pub struct Pipeline {
    layers: Vec<Layer>,
    router: Router,
    body_limit: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { layers: Vec::new(), router: Router::new(), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Appends a layer. Layers run in the order they are added.
    pub fn layer(mut self, layer: impl Middleware) -> Self {
        self.layers.push(std::sync::Arc::new(layer));
        self
    }

    /// Installs the route table, replacing any previous one.
    pub fn routes(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Handler for requests no route matched.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.router.set_fallback(handler);
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Answers one request.
    pub async fn call<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let (body, rejected) = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => (collected.to_bytes(), None),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                debug!(limit = self.body_limit, "request body over limit");
                (Bytes::new(), Some(BodyRejection::TooLarge(self.body_limit)))
            }
            Err(e) => {
                debug!(error = %e, "request body could not be read");
                (Bytes::new(), Some(BodyRejection::Unreadable))
            }
        };

        let mut req = Request::new(parts, body);
        req.rejected_body = rejected;

        Next::new(&self.layers, &self.router).run(req).await.into_inner()
    }
}

impl Default for Pipeline {
    fn default() -> Self { Self::new() }
}
