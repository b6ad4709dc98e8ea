use frontdoor::config::DownstreamUrls;
use frontdoor::{ServiceClients, ServiceTokenIssuer, Session};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "service-to-service-secret";

fn issuer() -> ServiceTokenIssuer {
    ServiceTokenIssuer::new(&SecretString::from(SECRET))
}

fn claims_of(token: &str) -> serde_json::Value {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    decode::<serde_json::Value>(token, &DecodingKey::from_secret(SECRET.as_bytes()), &validation)
        .unwrap()
        .claims
}

#[tokio::test]
async fn every_call_carries_the_gateway_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/order/1"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(header_exists("gatewaytoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(2)
        .mount(&server)
        .await;

    let client = issuer().build_client(&server.uri(), "order-service").unwrap();
    for _ in 0..2 {
        let res = client.get("/api/v1/order/1").send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    let received = server.received_requests().await.unwrap();
    let token = received[0].headers.get("gatewaytoken").unwrap().to_str().unwrap();
    assert_eq!(claims_of(token), json!({ "id": "order-service" }));
    assert_eq!(received[0].headers.get("gatewaytoken"), received[1].headers.get("gatewaytoken"));
}

#[tokio::test]
async fn on_behalf_of_adds_the_user_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/currentuser"))
        .and(header("authorization", "Bearer user.jwt"))
        .and(header_exists("gatewaytoken"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = issuer().build_client(&server.uri(), "auth").unwrap();
    let session = Session::new();
    session.set_jwt("user.jwt");

    let res = client
        .on_behalf_of(http::Method::GET, "/api/v1/auth/currentuser", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn downstream_cookies_are_sent_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("cookie", "sid=abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = issuer().build_client(&server.uri(), "auth").unwrap();
    client.post("/login").send().await.unwrap();
    assert_eq!(client.get("/me").send().await.unwrap().status(), 200);
}

#[tokio::test]
async fn clients_exist_only_for_configured_services() {
    let urls = DownstreamUrls {
        auth_base_url: Some("http://auth:4002".into()),
        gig_base_url: Some("http://gig:4004".into()),
        ..DownstreamUrls::default()
    };
    let clients = ServiceClients::from_config(&issuer(), &urls).unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(clients.get("gig").unwrap().base_url(), "http://gig:4004");
    assert!(clients.get("order").is_none());
}
