//! Failure injection tests for the balancer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_network_failure_moves_to_next_backend() {
    let dead = common::closed_port().await;
    let live = common::start_mock_backend("live").await;

    let balancer = common::start_balancer(common::test_config(vec![
        format!("http://{dead}/"),
        live.url(),
    ]))
    .await;

    let res = common::client()
        .post(balancer.url())
        .body("payload")
        .send()
        .await
        .expect("Balancer unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "live");

    let (claims, releases) = balancer.registry.claim_counts();
    assert_eq!(claims, 2, "one failed attempt, one successful");
    assert_eq!(claims, releases);

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_backend_error_is_bad_gateway_without_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend({
        let calls = calls.clone();
        move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (500, "boom".into())
            }
        }
    })
    .await;

    let balancer = common::start_balancer(common::test_config(vec![backend.url()])).await;

    let res = common::client()
        .post(balancer.url())
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Server error");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "5xx must not be retried");

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_slow_backend_times_out_then_retries() {
    let slow = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "slow".into())
    })
    .await;
    let fast = common::start_mock_backend("fast").await;

    let mut config = common::test_config(vec![slow.url(), fast.url()]);
    config.outgoing.forward_timeout_secs = 1;
    let balancer = common::start_balancer(config).await;

    let res = common::client()
        .post(balancer.url())
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "fast");

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_prober_evicts_dead_backend() {
    let b1 = common::start_mock_backend("b1").await;
    let b2 = common::start_mock_backend("b2").await;

    let mut config = common::test_config(vec![b1.url(), b2.url()]);
    config.health_check.enabled = true;
    config.health_check.interval_ms = 100;
    config.health_check.dial_timeout_secs = 1;
    let balancer = common::start_balancer(config).await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(balancer.registry.snapshot().iter().all(|s| s.alive));

    b2.stop().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snapshot = balancer.registry.snapshot();
    assert!(snapshot[0].alive);
    assert!(!snapshot[1].alive, "b2 should be evicted after its port closed");

    let client = common::client();
    for _ in 0..5 {
        let res = client.post(balancer.url()).body("x").send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "b1");
    }

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_full_queue_rejects_with_503() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(600)).await;
        (200, "done".into())
    })
    .await;

    let mut config = common::test_config(vec![backend.url()]);
    config.queue.capacity = 2;
    let balancer = common::start_balancer(config).await;
    let client = common::client();

    // One in flight, two queued.
    let mut accepted = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        let url = balancer.url();
        accepted.push(tokio::spawn(async move {
            client.post(url).body("x").send().await.unwrap().status()
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let rejected = client.post(balancer.url()).body("x").send().await.unwrap();
    assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(rejected.text().await.unwrap(), "Service unavailable");

    for handle in accepted {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_allowlist() {
    let backend = common::start_mock_backend("ok").await;

    let mut config = common::test_config(vec![backend.url()]);
    config.incoming.allowed_ips = vec!["10.0.0.1".into()];
    config.incoming.trust_real_ip_header = true;
    let balancer = common::start_balancer(config).await;
    let client = common::client();

    let denied = client
        .post(balancer.url())
        .header("X-Real-IP", "10.0.0.2")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(denied.text().await.unwrap(), "Access Denied");

    let allowed = client
        .post(balancer.url())
        .header("X-Real-IP", "10.0.0.1")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    assert_eq!(balancer.registry.claim_counts(), (1, 1));
    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_only_post_is_accepted() {
    let backend = common::start_mock_backend("ok").await;
    let balancer = common::start_balancer(common::test_config(vec![backend.url()])).await;

    let res = common::client().get(balancer.url()).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(balancer.registry.claim_counts(), (0, 0));

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_root_path_proxies_nested_paths() {
    let backend = common::start_mock_backend("ok").await;
    let balancer = common::start_balancer(common::test_config(vec![backend.url()])).await;

    let res = common::client()
        .post(format!("{}nested/path", balancer.url()))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ok");

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_response_is_bad_gateway() {
    let backend = common::start_programmable_backend(|_| async { (200, "x".repeat(4096)) }).await;

    let mut config = common::test_config(vec![backend.url()]);
    config.outgoing.max_response_bytes = 1024;
    let balancer = common::start_balancer(config).await;

    let res = common::client().post(balancer.url()).body("x").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Server error");
    assert_eq!(balancer.registry.claim_counts(), (1, 1));

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_forwarding_headers_and_body() {
    let backend = common::start_programmable_backend(|req: common::RecordedRequest| async move {
        let echo = format!(
            "{}|{}|{}|{}",
            req.method,
            req.header("x-forwarded-for").unwrap_or("-"),
            req.header("x-real-ip").unwrap_or("-"),
            req.body
        );
        (201, echo)
    })
    .await;

    let mut config = common::test_config(vec![backend.url()]);
    config.incoming.trust_real_ip_header = false;
    let balancer = common::start_balancer(config).await;

    let res = common::client()
        .post(balancer.url())
        .header("X-Forwarded-For", "203.0.113.7")
        .body(r#"{"job":42}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(
        res.text().await.unwrap(),
        r#"POST|203.0.113.7, 127.0.0.1|127.0.0.1|{"job":42}"#
    );

    balancer.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let backend = common::start_mock_backend("ok").await;
    let balancer = common::start_balancer(common::test_config(vec![backend.url()])).await;

    balancer.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), balancer.task)
        .await
        .expect("server should stop")
        .unwrap();

    assert!(common::client()
        .post(format!("http://{}/", balancer.addr))
        .body("x")
        .send()
        .await
        .is_err());
}
