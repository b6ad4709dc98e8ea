use std::sync::Arc;
use std::time::Duration;

use frontdoor::ClusterHealth;
use frontdoor::ReadinessGate;
use frontdoor::readiness::{ElasticsearchHealth, HealthError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn gate_opens_after_the_cluster_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "cluster_name": "jobber", "status": "green" })),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let health = ElasticsearchHealth::new(&server.uri(), Duration::from_secs(2)).unwrap();
    let gate = ReadinessGate::new(Box::new(health));
    assert!(!gate.is_ready());

    assert_eq!(gate.await_ready().await, 3);
    assert!(gate.is_ready());
    assert_eq!(gate.state().status.as_deref(), Some("green"));
}

#[tokio::test]
async fn undecodable_body_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let health = ElasticsearchHealth::new(&server.uri(), Duration::from_secs(2)).unwrap();
    assert!(health.cluster_health().await.is_err());
}

#[tokio::test]
async fn nothing_is_probed_before_await_ready() {
    let server = MockServer::start().await;
    let health = ElasticsearchHealth::new(&server.uri(), Duration::from_secs(2)).unwrap();
    let _gate = ReadinessGate::new(Box::new(health));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_connections_keep_the_gate_closed_until_the_cluster_listens() {
    let addr = {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        reserved.local_addr().unwrap()
    };

    let health = ElasticsearchHealth::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    assert!(matches!(health.cluster_health().await, Err(HealthError::Transport(_))));

    let gate = Arc::new(ReadinessGate::new(Box::new(health)));
    let waiting = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.await_ready().await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!gate.is_ready());
    assert!(!waiting.is_finished());

    let listener = std::net::TcpListener::bind(addr).unwrap();
    listener.set_nonblocking(true).unwrap();
    let server = MockServer::builder().listener(listener).start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "yellow" })))
        .mount(&server)
        .await;

    let attempts = tokio::time::timeout(Duration::from_secs(5), waiting).await.unwrap().unwrap();
    assert!(attempts > 1);
    assert!(gate.is_ready());
    assert_eq!(gate.state().status.as_deref(), Some("yellow"));
}

#[tokio::test]
async fn slow_cluster_times_out_as_a_failed_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "green" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let health = ElasticsearchHealth::new(&server.uri(), Duration::from_millis(50)).unwrap();
    match health.cluster_health().await {
        Err(HealthError::Transport(e)) => assert!(e.is_timeout()),
        other => panic!("expected a timeout, got {other:?}"),
    }
}
