#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use frontdoor::config::{Args, Config};
use frontdoor::readiness::{ClusterHealthResponse, HealthError};
use frontdoor::{ClusterHealth, Session, SessionCodec};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use jsonwebtoken::{EncodingKey, Header, encode};
use secrecy::SecretString;

pub const USER_SECRET: &str = "user-session-secret";
pub const SERVICE_SECRET: &str = "service-to-service-secret";
pub const COOKIE_KEY: &str = "cookie-key-one";
pub const CLIENT_URL: &str = "http://client.local";

pub fn config(extra: &[&str]) -> Config {
    let mut argv = vec![
        "frontdoor",
        "--jwt-token", USER_SECRET,
        "--gateway-jwt-token", SERVICE_SECRET,
        "--secret-key-one", COOKIE_KEY,
        "--client-url", CLIENT_URL,
    ];
    argv.extend_from_slice(extra);
    Args::parse_from(argv).into_config().unwrap()
}

/// Fails `failures` times, then reports `green`.
pub struct FlakyHealth {
    pub failures: u64,
    pub calls: Arc<AtomicU64>,
}

#[async_trait]
impl ClusterHealth for FlakyHealth {
    async fn cluster_health(&self) -> Result<ClusterHealthResponse, HealthError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(HealthError::Status(StatusCode::SERVICE_UNAVAILABLE))
        } else {
            Ok(ClusterHealthResponse { status: "green".into(), cluster_name: None })
        }
    }
}

pub fn sign_user_token(claims: &serde_json::Value, secret: &str) -> String {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

/// `Cookie` header value a browser would send after logging in with `jwt`.
pub fn session_cookie(jwt: &str) -> String {
    let codec = SessionCodec::new(&[SecretString::from(COOKIE_KEY)], false).unwrap();
    let session = Session::new();
    session.set_jwt(jwt);
    codec.seal(&session)
}

pub fn get(uri: &str) -> http::Request<Full<Bytes>> {
    http::Request::get(uri)
        .header("host", "gateway.local")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub async fn body_json(res: http::Response<Full<Bytes>>) -> serde_json::Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
