//! Failure injection tests for the reverse proxy.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use relay_proxy::config::{ClusterConfig, DestinationConfig, RouteConfig};
use relay_proxy::health::HealthState;

mod common;

#[tokio::test]
async fn test_retry_on_refused_connection() {
    let down = common::closed_addr().await;
    let up = common::start_mock_backend("up").await;

    let proxy = common::start_proxy(common::single_cluster_config(&[down, up])).await;

    let res = common::client().get(proxy.url("/")).send().await.expect("Proxy unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "up");
}

#[tokio::test]
async fn test_retry_after_connection_reset() {
    let (reset, resets) = common::start_reset_backend().await;
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let up = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (200, "up".to_string())
        }
    })
    .await;

    // Round-robin starts at the first destination, so the reset comes first.
    let proxy = common::start_proxy(common::single_cluster_config(&[reset, up])).await;

    let res = common::client().get(proxy.url("/")).send().await.expect("Proxy unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "up");
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_post_is_not_retried() {
    let down = common::closed_addr().await;
    let up = common::start_mock_backend("up").await;

    let proxy = common::start_proxy(common::single_cluster_config(&[down, up])).await;

    let res = common::client()
        .post(proxy.url("/"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_upstream_5xx_is_returned_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let b1 = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (503, "busy".to_string())
        }
    })
    .await;
    let b2 = common::start_mock_backend("b2").await;

    let proxy = common::start_proxy(common::single_cluster_config(&[b1, b2])).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "busy");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let up = common::start_mock_backend("up").await;
    let mut config = common::single_cluster_config(&[up]);
    config.routes = vec![RouteConfig::new("api", "/api/*", "web")];

    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let res = client.get(proxy.url("/other")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));

    let res = client.get(proxy.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_more_specific_prefix_wins() {
    let general = common::start_mock_backend("orders").await;
    let special = common::start_mock_backend("special").await;

    let mut config = common::single_cluster_config(&[]);
    config.routes = vec![
        RouteConfig::new("orders", "/orders/*", "general"),
        RouteConfig::new("special", "/orders/special", "special"),
    ];
    config.clusters = vec![
        ClusterConfig::new("general", vec![DestinationConfig::new(general.to_string())]),
        ClusterConfig::new("special", vec![DestinationConfig::new(special.to_string())]),
    ];

    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let body = client.get(proxy.url("/orders/special/1")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "special");
    let body = client.get(proxy.url("/orders/42")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "orders");
}

#[tokio::test]
async fn test_slow_destination_is_504() {
    let silent = common::start_silent_backend().await;
    let mut config = common::single_cluster_config(&[silent]);
    config.timeouts.attempt_ms = 200;

    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_max_in_flight_limit() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        (200, "slow".to_string())
    })
    .await;

    let mut config = common::single_cluster_config(&[backend]);
    config.clusters[0].destinations[0].max_in_flight = Some(2);
    config.retries.enabled = false;

    let proxy = common::start_proxy(config).await;
    let client = common::client();
    let url = proxy.url("/");

    let t1 = tokio::spawn(client.get(&url).send());
    let t2 = tokio::spawn(client.get(&url).send());

    let snapshots = proxy.snapshots.clone();
    assert!(
        common::eventually(Duration::from_secs(2), || {
            snapshots.current().cluster("web").unwrap().destinations()[0].in_flight() == 2
        })
        .await
    );

    let res3 = client.get(&url).send().await.unwrap();
    assert_eq!(res3.status(), StatusCode::SERVICE_UNAVAILABLE, "Should be rejected when max_in_flight hit");

    assert_eq!(t1.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(t2.await.unwrap().unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_check_eviction() {
    let b1 = common::start_mock_backend("b1").await;

    let b2_healthy = Arc::new(AtomicBool::new(true));
    let b2h = b2_healthy.clone();
    let b2 = common::start_programmable_backend(move || {
        let b2h = b2h.clone();
        async move {
            if b2h.load(Ordering::SeqCst) {
                (200, "b2".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let mut config = common::single_cluster_config(&[b1, b2]);
    config.health_check.active = true;
    config.health_check.interval_ms = 100;
    config.health_check.unhealthy_threshold = 2;
    config.health_check.healthy_threshold = 1;
    config.retries.enabled = false;

    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let mut b1_hits = 0;
    let mut b2_hits = 0;
    for _ in 0..20 {
        let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
        if body == "b1" {
            b1_hits += 1;
        }
        if body == "b2" {
            b2_hits += 1;
        }
    }
    assert!(b1_hits > 0, "b1 should have hits (got {})", b1_hits);
    assert!(b2_hits > 0, "b2 should have hits (got {})", b2_hits);

    b2_healthy.store(false, Ordering::SeqCst);

    let snapshots = proxy.snapshots.clone();
    assert!(
        common::eventually(Duration::from_secs(3), || {
            snapshots.current().cluster("web").unwrap().destinations()[1].health_state()
                == HealthState::Unhealthy
        })
        .await,
        "b2 should be marked unhealthy"
    );

    for _ in 0..10 {
        let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "b1", "Only b1 should be hit after b2 eviction");
    }
}

#[tokio::test]
async fn test_all_unhealthy_is_503() {
    let dead = common::start_programmable_backend(|| async { (500, "dead".to_string()) }).await;

    let mut config = common::single_cluster_config(&[dead]);
    config.health_check.active = true;
    config.health_check.interval_ms = 100;

    let proxy = common::start_proxy(config).await;

    let snapshots = proxy.snapshots.clone();
    assert!(
        common::eventually(Duration::from_secs(2), || {
            snapshots.current().cluster("web").unwrap().destinations()[0].health_state()
                == HealthState::Unhealthy
        })
        .await
    );

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!res.text().await.unwrap().contains("127.0.0.1"));
}

#[tokio::test]
async fn test_client_disconnect_releases_slot() {
    let streaming = common::start_streaming_backend(500, Duration::from_millis(20)).await;
    let proxy = common::start_proxy(common::single_cluster_config(&[streaming])).await;

    let mut res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let first = res.chunk().await.unwrap().expect("first chunk");
    assert!(first.starts_with(b"chunk-0"));

    let snapshots = proxy.snapshots.clone();
    let in_flight = move || snapshots.current().cluster("web").unwrap().destinations()[0].in_flight();
    assert_eq!(in_flight(), 1, "slot held while the body streams");

    drop(res);

    assert!(
        common::eventually(Duration::from_secs(3), || in_flight() == 0).await,
        "slot released after the caller went away"
    );
}

#[tokio::test]
async fn test_rejected_reload_keeps_snapshot() {
    let old = common::start_mock_backend("old").await;
    let new = common::start_mock_backend("new").await;

    let config = common::single_cluster_config(&[old]);
    let proxy = common::start_proxy(config.clone()).await;
    let client = common::client();
    assert_eq!(proxy.snapshots.current().version(), 1);

    let mut broken = common::single_cluster_config(&[new]);
    broken.routes[0].cluster = "missing".into();
    proxy.config_updates.send(broken).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(proxy.snapshots.current().version(), 1);
    let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "old");

    proxy.config_updates.send(common::single_cluster_config(&[new])).unwrap();

    let snapshots = proxy.snapshots.clone();
    assert!(common::eventually(Duration::from_secs(2), || snapshots.current().version() == 2).await);
    let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "new");
}
