//! Security policy layers: response hardening headers, CORS and the
//! duplicate-query-parameter guard.

use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    HeaderName, HeaderValue, ORIGIN, VARY,
};
use http::{Method, StatusCode};
use tracing::debug;

use crate::error::{ApiError, Error};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

// ── SecurityHeaders ───────────────────────────────────────────────────────────

const HARDENING_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", "default-src 'self';base-uri 'self';frame-ancestors 'self';object-src 'none'"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Adds the standard hardening headers to every response, error responses
/// included. A header the handler already set is left alone.
pub struct SecurityHeaders;

#[async_trait]
impl Middleware for SecurityHeaders {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let mut res = next.run(req).await;
        let headers = res.headers_mut();
        for &(name, value) in HARDENING_HEADERS {
            headers
                .entry(HeaderName::from_static(name))
                .or_insert_with(|| HeaderValue::from_static(value));
        }
        Ok(res)
    }
}

// ── Cors ──────────────────────────────────────────────────────────────────────

const ALLOWED_METHODS: &str = "GET, POST, DELETE, PUT, OPTIONS";

/// Cross-origin policy for a single trusted client origin, with credentials.
///
/// Preflight requests are answered here with `204` and never reach routing.
pub struct Cors {
    origin: HeaderValue,
}

impl Cors {
    pub fn new(client_url: &str) -> Result<Self, Error> {
        Ok(Self { origin: HeaderValue::from_str(client_url.trim_end_matches('/'))? })
    }

    fn decorate(&self, res: &mut Response) {
        let headers = res.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        headers.append(VARY, HeaderValue::from_static("origin"));
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let is_preflight = *req.method() == Method::OPTIONS
            && req.headers().contains_key(ORIGIN)
            && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);

        if is_preflight {
            let mut res = Response::status(StatusCode::NO_CONTENT);
            self.decorate(&mut res);
            let headers = res.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
            if let Some(requested) = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            }
            return Ok(res);
        }

        let mut res = next.run(req).await;
        self.decorate(&mut res);
        Ok(res)
    }
}

// ── ParameterPollution ────────────────────────────────────────────────────────

/// Collapses repeated query parameters to their last value, so handlers never
/// see `?role=user&role=admin` as a list.
pub struct ParameterPollution;

#[async_trait]
impl Middleware for ParameterPollution {
    async fn handle(&self, mut req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let pairs = req.query_pairs();
        let mut kept: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        let mut polluted = false;

        for (key, value) in pairs {
            match kept.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => {
                    slot.1 = value;
                    polluted = true;
                }
                None => kept.push((key, value)),
            }
        }

        if polluted {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&kept)
                .finish();
            debug!(path = req.path(), "collapsed repeated query parameters");
            req.set_query(&query)?;
        }

        Ok(next.run(req).await)
    }
}
