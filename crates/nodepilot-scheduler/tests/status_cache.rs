// Status cache polling, stale-but-available behaviour and health tracking.

use std::sync::Arc;
use std::time::Duration;

use nodepilot_scheduler::StatusCache;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_for(server: &MockServer) -> StatusCache {
    StatusCache::new(
        &format!("{}/api/nodes", server.uri()),
        Duration::from_millis(300),
        5,
    )
    .unwrap()
}

fn nodes_body() -> serde_json::Value {
    json!({
        "nodes": {
            "node-b": {
                "name": "render-b", "os": "Windows", "ip": "10.0.0.12",
                "lastbootuptime": "2024-01-01T06:00:00Z", "status": "online",
                "conn": 2, "pwr": 87.5
            },
            "node-a": {
                "name": "render-a", "os": "Linux", "ip": "10.0.0.11",
                "lastbootuptime": "2024-01-01T05:00:00Z", "status": "offline"
            }
        }
    })
}

async fn mount_nodes(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_failure(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn successful_poll_upserts_nodes_with_defaults() {
    let server = MockServer::start().await;
    mount_nodes(&server, nodes_body()).await;
    let cache = cache_for(&server);

    cache.refresh().await;

    let snap = cache.snapshot();
    assert_eq!(snap.nodes.len(), 2);
    assert_eq!(snap.nodes[0].node_id, "node-a");
    assert_eq!(snap.nodes[0].conn, 0);
    assert_eq!(snap.nodes[0].pwr, 0.0);
    assert_eq!(snap.nodes[1].name, "render-b");
    assert_eq!(snap.nodes[1].conn, 2);
    assert_eq!(snap.nodes[1].pwr, 87.5);
    assert!(snap.health.is_working);
    assert!(snap.health.last_successful.is_some());
    assert_eq!(snap.health.consecutive_failures, 0);
}

#[tokio::test]
async fn later_poll_overwrites_rows_and_keeps_absent_ones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nodes_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_nodes(
        &server,
        json!({"nodes": {"node-a": {"name": "render-a", "status": "online"}}}),
    )
    .await;
    let cache = cache_for(&server);

    cache.refresh().await;
    cache.refresh().await;

    assert_eq!(cache.node("node-a").unwrap().status, "online");
    // upsert-only: node-b was not in the second poll but is never deleted
    assert_eq!(cache.node("node-b").unwrap().status, "online");
    assert_eq!(cache.snapshot().nodes.len(), 2);
}

#[tokio::test]
async fn failed_poll_keeps_last_known_good_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nodes_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_failure(&server, 503).await;
    let cache = cache_for(&server);

    cache.refresh().await;
    let before = cache.snapshot();
    cache.refresh().await;
    let after = cache.snapshot();

    assert_eq!(before.nodes, after.nodes);
    assert!(!after.health.is_working);
    assert_eq!(after.health.consecutive_failures, 1);
    assert!(after.health.last_error.contains("503"));
    assert_eq!(after.health.last_successful, before.health.last_successful);
}

#[tokio::test]
async fn five_failures_mark_api_down_and_success_resets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(6)
        .mount(&server)
        .await;
    mount_nodes(&server, nodes_body()).await;
    let cache = cache_for(&server);

    for _ in 0..6 {
        cache.refresh().await;
    }
    let health = cache.health();
    assert!(!health.is_working);
    assert_eq!(health.consecutive_failures, 6);
    assert!(!health.last_error.is_empty());

    cache.refresh().await;
    let health = cache.health();
    assert!(health.is_working);
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.last_error.is_empty());
}

#[tokio::test]
async fn timeout_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(nodes_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let cache = cache_for(&server);

    cache.refresh().await;

    assert!(cache.snapshot().nodes.is_empty());
    assert!(!cache.health().is_working);
    assert_eq!(cache.health().consecutive_failures, 1);
}

#[tokio::test]
async fn malformed_body_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;
    let cache = cache_for(&server);

    cache.refresh().await;
    assert!(!cache.health().is_working);
}

#[tokio::test]
async fn body_without_nodes_counts_as_failure() {
    let server = MockServer::start().await;
    mount_nodes(&server, json!({"error": "unauthorized"})).await;
    let cache = cache_for(&server);

    for _ in 0..5 {
        cache.refresh().await;
    }

    let health = cache.health();
    assert!(!health.is_working);
    assert_eq!(health.consecutive_failures, 5);
    assert!(health.last_successful.is_none());
    assert!(cache.snapshot().nodes.is_empty());
}

#[tokio::test]
async fn explicit_empty_node_map_is_a_successful_poll() {
    let server = MockServer::start().await;
    mount_nodes(&server, json!({"nodes": {}})).await;
    let cache = cache_for(&server);

    cache.refresh().await;

    let health = cache.health();
    assert!(health.is_working);
    assert!(health.last_successful.is_some());
    assert!(cache.snapshot().nodes.is_empty());
}

#[tokio::test]
async fn one_bad_node_does_not_drop_the_others() {
    let server = MockServer::start().await;
    mount_nodes(
        &server,
        json!({
            "nodes": {
                "node-a": {"name": "render-a", "status": "online", "conn": 1, "pwr": 40.0},
                "node-b": {"name": "render-b", "status": "online", "conn": "3", "pwr": "n/a"},
                "node-c": "not an object"
            }
        }),
    )
    .await;
    let cache = cache_for(&server);

    cache.refresh().await;

    let snap = cache.snapshot();
    assert!(snap.health.is_working);
    assert_eq!(snap.nodes.len(), 2);
    assert_eq!(cache.node("node-a").unwrap().conn, 1);
    let b = cache.node("node-b").unwrap();
    assert_eq!(b.conn, 3);
    assert_eq!(b.pwr, 0.0);
    assert!(cache.node("node-c").is_none());
}

#[tokio::test]
async fn concurrent_refreshes_run_one_at_a_time() {
    let delay = Duration::from_millis(200);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/nodes"))
        .respond_with(ResponseTemplate::new(500).set_delay(delay))
        .mount(&server)
        .await;
    let cache = cache_for(&server);

    let started = std::time::Instant::now();
    tokio::join!(cache.refresh(), cache.refresh());

    // the second poll only starts once the first has been applied
    assert!(started.elapsed() >= delay * 2);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 2);
    let health = cache.health();
    assert!(!health.is_working);
    assert_eq!(health.consecutive_failures, 2);
}

#[tokio::test]
async fn snapshot_never_polls() {
    let server = MockServer::start().await;
    mount_nodes(&server, nodes_body()).await;
    let cache = cache_for(&server);

    let _ = cache.snapshot();
    let _ = cache.health();
    let _ = cache.node("node-a");

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn refresh_loop_polls_immediately_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    mount_nodes(&server, nodes_body()).await;
    let cache = Arc::new(cache_for(&server));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = Arc::clone(&cache).spawn_refresh_loop(Duration::from_secs(3600), shutdown_rx);
    for _ in 0..50 {
        if !cache.snapshot().nodes.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(cache.snapshot().nodes.len(), 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("refresh loop must exit on shutdown")
        .unwrap();
}
