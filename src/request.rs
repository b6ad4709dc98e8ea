//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::request::Parts;
use http::uri::{PathAndQuery, Uri};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;

use crate::auth::IdentityPayload;
use crate::error::ApiError;
use crate::session::Session;

/// Why the body was not collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyRejection {
    TooLarge(usize),
    Unreadable,
}

/// An incoming HTTP request plus the per-request context the pipeline
/// attaches to it: path parameters, the decoded session and, once verified,
/// the caller's identity.
///
/// A `Request` is owned by exactly one in-flight request and is never shared.
pub struct Request {
    pub(crate) parts: Parts,
    pub(crate) original_uri: Uri,
    pub(crate) body: Bytes,
    pub(crate) rejected_body: Option<BodyRejection>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) session: Session,
    pub(crate) identity: Option<IdentityPayload>,
}

impl Request {
    pub(crate) fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            original_uri: parts.uri.clone(),
            parts,
            body,
            rejected_body: None,
            params: HashMap::new(),
            session: Session::new(),
            identity: None,
        }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decoded query-string pairs, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}"), "request body"))
    }

    pub fn session(&self) -> &Session { &self.session }

    /// The verified identity, if a verification guard attached one.
    pub fn identity(&self) -> Option<&IdentityPayload> { self.identity.as_ref() }

    /// Attaches the verified identity. An identity is immutable once
    /// attached, so a second attach is refused.
    pub(crate) fn attach_identity(&mut self, identity: IdentityPayload) -> Result<(), ApiError> {
        if self.identity.is_some() {
            return Err(ApiError::internal("identity already attached", "attach_identity"));
        }
        self.identity = Some(identity);
        Ok(())
    }

    /// The URL as the client called it: `scheme://host/original-path?query`.
    ///
    /// The scheme honours `x-forwarded-proto` from the fronting proxy.
    pub fn full_url(&self) -> String {
        let scheme = self
            .header("x-forwarded-proto")
            .and_then(|p| p.split(',').next())
            .map(str::trim)
            .or_else(|| self.original_uri.scheme_str())
            .unwrap_or("http");
        let host = self
            .header("host")
            .or_else(|| self.original_uri.authority().map(|a| a.as_str()))
            .unwrap_or("");
        let path = self
            .original_uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        format!("{scheme}://{host}{path}")
    }

    /// Replaces the query string, keeping the path.
    pub(crate) fn set_query(&mut self, query: &str) -> Result<(), ApiError> {
        let path_and_query = if query.is_empty() {
            self.path().to_owned()
        } else {
            format!("{}?{query}", self.path())
        };
        let mut uri = self.parts.uri.clone().into_parts();
        uri.path_and_query = Some(
            path_and_query
                .parse()
                .map_err(|_| ApiError::bad_request("malformed query string", "set_query"))?,
        );
        self.parts.uri = Uri::from_parts(uri)
            .map_err(|_| ApiError::bad_request("malformed request uri", "set_query"))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: Method, uri: &str) -> Self {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        Self::new(parts, Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_uses_host_and_forwarded_proto() {
        let (parts, ()) = http::Request::builder()
            .uri("/api/v1/missing?x=1")
            .header("host", "gateway.local:4000")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::new(parts, Bytes::new());
        assert_eq!(req.full_url(), "https://gateway.local:4000/api/v1/missing?x=1");
    }

    #[test]
    fn full_url_keeps_original_query_after_rewrite() {
        let mut req = Request::for_test(Method::GET, "/a?b=1&b=2");
        req.set_query("b=2").unwrap();
        assert_eq!(req.uri().query(), Some("b=2"));
        assert_eq!(req.full_url(), "http:///a?b=1&b=2");
    }

    #[test]
    fn identity_attaches_once() {
        let mut req = Request::for_test(Method::GET, "/");
        let id: IdentityPayload = serde_json::from_value(serde_json::json!({ "sub": "u1" })).unwrap();
        req.attach_identity(id.clone()).unwrap();
        assert!(req.attach_identity(id).is_err());
        assert_eq!(req.identity().and_then(IdentityPayload::subject), Some("u1"));
    }
}
