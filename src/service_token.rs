//! Service-to-service credentials and the outbound clients that carry them.
//!
//! When the gateway calls a downstream service it identifies itself with a
//! `gatewaytoken` header: an HS256 token signed with the service-to-service
//! secret whose claim set is `{ "id": "<client name>" }`. Each downstream gets
//! one [`OutboundClient`] for the lifetime of the process, with the header
//! computed once when the client is built. Rotating the secret or the name
//! means building a new client.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DownstreamUrls;
use crate::error::Error;
use crate::session::Session;

/// Header carrying the [`ServiceCredential`] on every outbound call.
pub const GATEWAY_TOKEN_HEADER: HeaderName = HeaderName::from_static("gatewaytoken");

/// Claims of a service credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// A signed service credential. Empty when minted for an unnamed caller.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ServiceCredential(String);

impl ServiceCredential {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("ServiceCredential(<empty>)")
        } else {
            f.write_str("ServiceCredential(<redacted>)")
        }
    }
}

/// Mints [`ServiceCredential`]s with the service-to-service secret.
pub struct ServiceTokenIssuer {
    key: EncodingKey,
    ttl: Option<Duration>,
}

impl ServiceTokenIssuer {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            ttl: None,
        }
    }

    /// Adds `iat` and `exp` claims to every credential minted from now on.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Signs a credential naming `caller`.
    ///
    /// An empty name yields an empty credential rather than an error;
    /// downstream services that authorise on the header will then reject the
    /// call, so callers that need authorisation must pass a name.
    pub fn issue(&self, caller: &str) -> Result<ServiceCredential, Error> {
        if caller.is_empty() {
            return Ok(ServiceCredential::default());
        }

        let (iat, exp) = match self.ttl {
            Some(ttl) => {
                let now = get_current_timestamp();
                (Some(now), Some(now + ttl.as_secs()))
            }
            None => (None, None),
        };
        let claims = ServiceClaims { id: caller.to_owned(), iat, exp };

        let token = encode(&Header::default(), &claims, &self.key)?;
        Ok(ServiceCredential(token))
    }

    /// Builds the client for one downstream service.
    ///
    /// Every request it sends carries JSON content negotiation headers and
    /// the `gatewaytoken` credential for `caller`, and it keeps a cookie
    /// store so credentials set by the downstream are sent back.
    pub fn build_client(&self, base_url: &str, caller: &str) -> Result<OutboundClient, Error> {
        let credential = self.issue(caller)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut token = HeaderValue::from_str(credential.as_str())?;
        token.set_sensitive(true);
        headers.insert(GATEWAY_TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        debug!(service = caller, base_url, "outbound client built");
        Ok(OutboundClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            service: caller.to_owned(),
            http,
        })
    }
}

/// HTTP client for one downstream service.
///
/// Cheap to clone; clones share the connection pool and cookie store.
#[derive(Clone, Debug)]
pub struct OutboundClient {
    base_url: String,
    service: String,
    http: reqwest::Client,
}

impl OutboundClient {
    pub fn base_url(&self) -> &str { &self.base_url }
    pub fn service(&self) -> &str { &self.service }

    /// Starts a request to `base_url + path`.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    pub fn get(&self, path: &str) -> RequestBuilder { self.request(Method::GET, path) }
    pub fn post(&self, path: &str) -> RequestBuilder { self.request(Method::POST, path) }
    pub fn put(&self, path: &str) -> RequestBuilder { self.request(Method::PUT, path) }
    pub fn delete(&self, path: &str) -> RequestBuilder { self.request(Method::DELETE, path) }

    /// Starts a request made for the user behind `session`, forwarding their
    /// Session Credential as a bearer token on this request only.
    pub fn on_behalf_of(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        let builder = self.request(method, path);
        match session.jwt() {
            Some(jwt) => builder.header(AUTHORIZATION, format!("Bearer {jwt}")),
            None => builder,
        }
    }
}

/// The outbound clients of every configured downstream service, keyed by
/// client name.
#[derive(Clone, Debug, Default)]
pub struct ServiceClients {
    clients: HashMap<String, OutboundClient>,
}

impl ServiceClients {
    /// Builds one client per configured downstream. Unconfigured services
    /// are skipped.
    pub fn from_config(issuer: &ServiceTokenIssuer, urls: &DownstreamUrls) -> Result<Self, Error> {
        let mut clients = HashMap::new();
        for (service, base_url) in urls.configured() {
            let client = issuer.build_client(base_url, service)?;
            clients.insert(service.to_owned(), client);
        }
        info!(count = clients.len(), "downstream clients ready");
        Ok(Self { clients })
    }

    pub fn get(&self, service: &str) -> Option<&OutboundClient> {
        self.clients.get(service)
    }

    pub fn insert(&mut self, client: OutboundClient) {
        self.clients.insert(client.service.clone(), client);
    }

    pub fn len(&self) -> usize { self.clients.len() }
    pub fn is_empty(&self) -> bool { self.clients.is_empty() }
}
