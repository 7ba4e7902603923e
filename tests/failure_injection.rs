//! Failure injection tests for the forwarding engine.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use edge_proxy::config::OverloadMode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

use common::{single_route_config, spawn_proxy};

#[tokio::test]
async fn refused_connection_is_bad_gateway() {
    let dead = common::unused_addr().await;
    let proxy = spawn_proxy(single_route_config(dead)).await;

    let start = Instant::now();
    let res = common::client().get(proxy.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(proxy.engine.limiter().in_flight(), 0);
}

#[tokio::test]
async fn silent_upstream_times_out_with_gateway_timeout() {
    let silent = common::start_silent_backend().await;
    let mut config = single_route_config(silent);
    config.timeouts.headers_secs = 1;
    let proxy = spawn_proxy(config).await;

    let start = Instant::now();
    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "timed out too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "timed out too late: {elapsed:?}");
}

#[tokio::test]
async fn request_deadline_caps_headers_timeout() {
    let silent = common::start_silent_backend().await;
    let mut config = single_route_config(silent);
    config.timeouts.headers_secs = 30;
    config.timeouts.request_secs = 1;
    let proxy = spawn_proxy(config).await;

    let start = Instant::now();
    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn reject_policy_sheds_excess_requests() {
    let backend = common::start_echo_backend().await;
    let mut config = single_route_config(backend);
    config.limits.max_in_flight = 1;
    config.limits.overload = OverloadMode::Reject;
    let proxy = spawn_proxy(config).await;
    let client = common::client();

    let slow = {
        let client = client.clone();
        let url = proxy.url("/slow");
        tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let res = client.get(proxy.url("/fast")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(slow.await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn queue_policy_waits_for_a_free_slot() {
    let backend = common::start_echo_backend().await;
    let mut config = single_route_config(backend);
    config.limits.max_in_flight = 1;
    config.limits.overload = OverloadMode::Queue;
    config.limits.queue_timeout_ms = 5_000;
    let proxy = spawn_proxy(config).await;
    let client = common::client();

    let slow = {
        let client = client.clone();
        let url = proxy.url("/slow");
        tokio::spawn(async move {
            let res = client.get(url).send().await.unwrap();
            let status = res.status();
            // The slot is held until the body is fully relayed.
            res.bytes().await.unwrap();
            status
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    let res = client.get(proxy.url("/fast")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(slow.await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn caller_disconnect_cancels_upstream() {
    let (backend, mut upstream_closed) = common::start_trickle_backend().await;
    let proxy = spawn_proxy(single_route_config(backend)).await;

    let client = common::client();
    let mut res = client.get(proxy.url("/stream")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.chunk().await.unwrap().is_some());
    drop(res);
    drop(client);

    tokio::time::timeout(Duration::from_secs(5), upstream_closed.recv())
        .await
        .expect("upstream connection was not closed after caller left")
        .unwrap();

    // The in-flight slot goes back once the relay is dropped.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.engine.limiter().in_flight(), 0);
}

#[tokio::test]
async fn request_deadline_aborts_an_endless_body() {
    let (backend, mut upstream_closed) = common::start_trickle_backend().await;
    let mut config = single_route_config(backend);
    config.timeouts.request_secs = 1;
    let proxy = spawn_proxy(config).await;

    let res = common::client().get(proxy.url("/stream")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("relay outlived the request deadline");
    assert!(body.is_err(), "truncated body must surface as an error");

    tokio::time::timeout(Duration::from_secs(5), upstream_closed.recv())
        .await
        .expect("upstream connection was not closed at the deadline")
        .unwrap();
}

#[tokio::test]
async fn stalled_caller_releases_slot_at_deadline() {
    let (backend, _) = common::start_streaming_backend(1024 * 1024 * 1024, 64 * 1024).await;
    let mut config = single_route_config(backend);
    config.timeouts.request_secs = 1;
    config.limits.max_in_flight = 1;
    config.limits.overload = OverloadMode::Reject;
    let proxy = spawn_proxy(config).await;

    // Ask for a huge body and never read the response.
    let mut stalled = TcpStream::connect(proxy.addr).await.unwrap();
    stalled
        .write_all(b"GET /big HTTP/1.1\r\nHost: proxy.test\r\n\r\n")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(proxy.engine.limiter().in_flight(), 0, "slot still held past the request deadline");

    let res = common::client().get(proxy.url("/next")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    drop(res);

    // The stalled caller's connection was closed by the proxy.
    let mut buf = vec![0u8; 64 * 1024];
    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match stalled.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "stalled caller connection was left open");

    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("shutdown waited on a dead relay")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_is_bounded_by_the_request_deadline() {
    let (backend, _) = common::start_streaming_backend(1024 * 1024 * 1024, 64 * 1024).await;
    let mut config = single_route_config(backend);
    config.timeouts.request_secs = 2;
    let proxy = spawn_proxy(config).await;

    let mut stalled = TcpStream::connect(proxy.addr).await.unwrap();
    stalled
        .write_all(b"GET /big HTTP/1.1\r\nHost: proxy.test\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let start = Instant::now();
    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), proxy.handle)
        .await
        .expect("shutdown hung on a caller that stopped reading")
        .unwrap()
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(proxy.engine.limiter().in_flight(), 0);
}
