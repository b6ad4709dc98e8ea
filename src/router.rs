//! Radix-tree route table.
//!
//! One tree per HTTP method, O(path-length) lookup. Routes may carry guard
//! middleware that runs after the global chain and before the handler;
//! that is where identity verification and requirement live. A request that
//! matches nothing goes to the fallback handler.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::ApiError;
use crate::handler::{BoxFuture, BoxedHandler, Endpoint, Handler};
use crate::middleware::{Layer, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone)]
struct Route {
    guards: Arc<[Layer]>,
    handler: BoxedHandler,
}

/// The application route table.
///
/// Build it once at startup. Each registration returns `self` so calls
/// chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    fallback: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), fallback: None }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use frontdoor::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a malformed or conflicting path. Route tables are built at
    /// startup, so this surfaces before any traffic is accepted.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.guarded(method, path, Vec::new(), handler)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Register a handler behind route guards, run in the given order.
    pub fn guarded(
        mut self,
        method: Method,
        path: &str,
        guards: Vec<Layer>,
        handler: impl Handler,
    ) -> Self {
        let route = Route { guards: guards.into(), handler: handler.into_boxed_handler() };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Handler for requests no route matched.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(handler.into_boxed_handler());
        self
    }

    pub(crate) fn set_fallback(&mut self, handler: impl Handler) {
        self.fallback = Some(handler.into_boxed_handler());
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Route, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Endpoint for Router {
    fn call(&self, mut req: Request) -> BoxFuture<'_, Result<Response, ApiError>> {
        Box::pin(async move {
            match self.lookup(req.method(), req.path()) {
                Some((route, params)) => {
                    req.params = params;
                    Ok(Next::new(&route.guards, route.handler.as_ref()).run(req).await)
                }
                None => match &self.fallback {
                    Some(fallback) => fallback.call(req).await,
                    None => Ok(Response::status(StatusCode::NOT_FOUND)),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_id(req: Request) -> Response {
        Response::text(req.param("id").unwrap_or("none").to_owned())
    }

    #[tokio::test]
    async fn matches_method_and_extracts_params() {
        let router = Router::new().get("/users/{id}", echo_id);

        let res = router.call(Request::for_test(Method::GET, "/users/42")).await.unwrap();
        assert_eq!(res.body().as_ref(), b"42");

        let res = router.call(Request::for_test(Method::POST, "/users/42")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmatched_requests_reach_the_fallback() {
        let router = Router::new()
            .get("/known", echo_id)
            .fallback(|_req: Request| async { Response::status(StatusCode::IM_A_TEAPOT) });

        let res = router.call(Request::for_test(Method::GET, "/unknown")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }
}
