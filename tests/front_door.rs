mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use common::*;
use frontdoor::config::Config;
use frontdoor::{ClusterHealth, Gateway, Pipeline};
use http::StatusCode;
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, SET_COOKIE};
use http_body_util::Full;
use serde_json::json;

fn gateway(config: Config, failures: u64) -> (Gateway, Arc<AtomicU64>, Arc<AtomicU64>) {
    let probes = Arc::new(AtomicU64::new(0));
    let built = Arc::new(AtomicU64::new(0));
    let (p, b) = (Arc::clone(&probes), Arc::clone(&built));
    let gateway = Gateway::with_health_check(
        config,
        Box::new(move |_config: &Config| {
            b.fetch_add(1, Ordering::SeqCst);
            Ok::<_, frontdoor::Error>(
                Box::new(FlakyHealth { failures, calls: Arc::clone(&p) }) as Box<dyn ClusterHealth>,
            )
        }),
    )
    .unwrap();
    (gateway, probes, built)
}

async fn pipeline() -> Pipeline {
    let (gateway, _, _) = gateway(config(&[]), 0);
    gateway.build().await.unwrap()
}

#[tokio::test]
async fn build_waits_for_the_search_index() {
    let (gateway, probes, _) = gateway(config(&[]), 2);
    let gate = gateway.readiness().unwrap();
    assert!(!gate.is_ready());

    gateway.build().await.unwrap();
    assert!(gate.is_ready());
    assert_eq!(probes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn readiness_gate_is_a_single_instance() {
    let (gateway, _, built) = gateway(config(&[]), 0);
    let first = gateway.readiness().unwrap();
    let second = gateway.readiness().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let pipeline = gateway.build().await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.call(get("/readyz")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404_with_exact_body() {
    let res = pipeline().await.call(get("/api/v1/nothing?x=1")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], CLIENT_URL);
    assert_eq!(body_json(res).await, json!({ "message": "endpoint called does not exist" }));
}

#[tokio::test]
async fn liveness_answers_once_built() {
    let res = pipeline().await.call(get("/gateway-health")).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_session_is_401() {
    let res = pipeline().await.call(get("/api/gateway/v1/auth/identity")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(res).await;
    assert_eq!(body["message"], "Token is not available. Please login again.");
    assert_eq!(body["statusCode"], 401);
}

#[tokio::test]
async fn protected_route_with_valid_session_returns_identity() {
    let jwt = sign_user_token(&json!({ "sub": "u1" }), USER_SECRET);
    let mut req = get("/api/gateway/v1/auth/identity");
    req.headers_mut().insert("cookie", session_cookie(&jwt).parse().unwrap());

    let res = pipeline().await.call(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(SET_COOKIE).is_none());
    assert_eq!(body_json(res).await["user"], json!({ "sub": "u1" }));
}

#[tokio::test]
async fn credential_signed_with_service_secret_is_rejected() {
    let jwt = sign_user_token(&json!({ "sub": "u1" }), SERVICE_SECRET);
    let mut req = get("/api/gateway/v1/auth/identity");
    req.headers_mut().insert("cookie", session_cookie(&jwt).parse().unwrap());

    assert_eq!(pipeline().await.call(req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signout_expires_the_session_cookie() {
    let jwt = sign_user_token(&json!({ "sub": "u1" }), USER_SECRET);
    let req = http::Request::post("/api/gateway/v1/auth/signout")
        .header("cookie", session_cookie(&jwt))
        .body(Full::new(Bytes::new()))
        .unwrap();

    let res = pipeline().await.call(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookies: Vec<_> = res.headers().get_all(SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.to_str().unwrap().contains("Max-Age=0")));
    assert_eq!(body_json(res).await, json!({ "message": "Logout successful", "user": {} }));
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let req = http::Request::builder()
        .method("OPTIONS")
        .uri("/api/gateway/v1/auth/identity")
        .header("origin", CLIENT_URL)
        .header("access-control-request-method", "GET")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let res = pipeline().await.call(req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");
    assert_eq!(res.headers()["access-control-allow-methods"], "GET, POST, DELETE, PUT, OPTIONS");
}

#[tokio::test]
async fn oversized_body_is_413() {
    let (gateway, _, _) = gateway(config(&["--body-limit-bytes", "16"]), 0);
    let pipeline = gateway.build().await.unwrap();
    let req = http::Request::post("/api/gateway/v1/auth/signout")
        .body(Full::new(Bytes::from(vec![b'x'; 64])))
        .unwrap();

    assert_eq!(pipeline.call(req).await.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn production_cookies_are_secure() {
    let (gateway, _, _) = gateway(
        config(&["--environment", "production", "--secret-key-two", "cookie-key-two"]),
        0,
    );
    let pipeline = gateway.build().await.unwrap();

    let jwt = sign_user_token(&json!({ "sub": "u1" }), USER_SECRET);
    let req = http::Request::post("/api/gateway/v1/auth/signout")
        .header("cookie", session_cookie(&jwt))
        .body(Full::new(Bytes::new()))
        .unwrap();

    let res = pipeline.call(req).await;
    let cookie = res.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.ends_with("; Secure"));
}

#[tokio::test]
async fn service_credential_is_not_a_user_identity_with_development_defaults() {
    use clap::Parser;
    use frontdoor::config::Args;
    use frontdoor::{ServiceTokenIssuer, Session, SessionCodec};

    let config = Args::parse_from(["frontdoor"]).into_config().unwrap();
    let credential = ServiceTokenIssuer::new(&config.gateway_jwt_token).issue("auth").unwrap();
    let codec = SessionCodec::new(&config.session_keys, false).unwrap();
    let session = Session::new();
    session.set_jwt(credential.as_str());

    let (gateway, _, _) = gateway(config, 0);
    let pipeline = gateway.build().await.unwrap();
    let mut req = get("/api/gateway/v1/auth/identity");
    req.headers_mut().insert("cookie", codec.seal(&session).parse().unwrap());

    assert_eq!(pipeline.call(req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn compression_threshold_comes_from_config() {
    let (gateway, _, _) = gateway(config(&["--compression-threshold-bytes", "1"]), 0);
    let pipeline = gateway.build().await.unwrap();

    let mut req = get("/gateway-health");
    req.headers_mut().insert("accept-encoding", "gzip".parse().unwrap());
    let res = pipeline.call(req).await;
    assert_eq!(res.headers()["content-encoding"], "gzip");

    let mut req = get("/gateway-health");
    req.headers_mut().insert("accept-encoding", "gzip;q=0".parse().unwrap());
    assert!(pipeline.call(req).await.headers().get("content-encoding").is_none());
}
