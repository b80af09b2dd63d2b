//! End-to-end tests over HTTP: real listener, mock backends, reqwest client.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use edge_gateway::admin::setup_admin_router;
use edge_gateway::config::GatewayConfig;
use edge_gateway::http::HttpServer;
use tokio::net::TcpListener;
use tower::ServiceExt;

mod common;
use common::{call_log, proxy_config, start_gateway, start_mock_backend, start_programmable_backend, Behavior, TestFilter};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_proxies_request_to_backend() {
    let backend = start_mock_backend("hello from backend").await;
    let (addr, shutdown, _config_tx) = start_gateway(HttpServer::new(proxy_config(&[backend.to_string()]))).await;

    let res = client()
        .get(format!("http://{addr}/anything?x=1"))
        .header("X-Request-ID", "req-42")
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-request-id"], "req-42");
    assert!(res.headers()["server"].to_str().unwrap().starts_with("edge-gateway/"));
    assert_eq!(res.text().await.unwrap(), "hello from backend");

    shutdown.trigger();
}

#[tokio::test]
async fn test_throttled_backend_is_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (503, "busy".to_string())
            } else {
                (200, "recovered".to_string())
            }
        }
    })
    .await;

    let mut config = proxy_config(&[backend.to_string()]);
    config.origins[0].max_retries = 2;
    config.origins[0].retry_on_503 = true;
    let (addr, shutdown, _config_tx) = start_gateway(HttpServer::new(config)).await;

    let res = client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_origin_returns_bad_gateway() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = proxy_config(&[closed.to_string()]);
    config.origins[0].max_retries = 0;
    let (addr, shutdown, _config_tx) = start_gateway(HttpServer::new(config)).await;

    let res = client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY.as_u16());
    assert!(res.headers().contains_key("x-request-id"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_debug_header_exposes_filter_summary() {
    let backend = start_mock_backend("ok").await;
    let (addr, shutdown, _config_tx) = start_gateway(HttpServer::new(proxy_config(&[backend.to_string()]))).await;

    let res = client()
        .get(format!("http://{addr}/"))
        .header("X-Gateway-Debug", "1")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-gateway-status"], "SUCCESS");
    let filters = res.headers()["x-gateway-filters"].to_str().unwrap().to_string();
    assert!(filters.contains("inbound.RouteFilter[SUCCESS]"), "{filters}");
    assert!(filters.contains("endpoint.ProxyEndpoint[SUCCESS]"), "{filters}");

    shutdown.trigger();
}

#[tokio::test]
async fn test_config_reload_switches_origin() {
    let first = start_mock_backend("first").await;
    let second = start_mock_backend("second").await;
    let (addr, shutdown, config_tx) = start_gateway(HttpServer::new(proxy_config(&[first.to_string()]))).await;
    let client = client();

    let res = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "first");

    config_tx.send(proxy_config(&[second.to_string()])).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "second");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unrouted_request_gets_404_with_custom_outbound_filter() {
    let log = call_log();
    let server = HttpServer::builder(GatewayConfig::default())
        .filter(TestFilter::outbound("stamp", 20, Behavior::SetHeader("X-Stamp", "1"), &log).shared())
        .build();

    let response = server
        .router()
        .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-stamp"], "1");
    assert_eq!(body_text(response).await, "Not Found");
}

#[tokio::test]
async fn test_duplicate_host_headers_are_rejected() {
    let server = HttpServer::new(GatewayConfig::default());
    let request = Request::builder()
        .uri("/")
        .header("host", "a.example.com")
        .header("host", "b.example.com")
        .body(Body::empty())
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let mut config = GatewayConfig::default();
    config.limits.max_body_size = 4;
    let server = HttpServer::new(config);
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(Body::from("far too long"))
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_admin_api_requires_token() {
    let mut config = GatewayConfig::default();
    config.admin.api_key = "secret".to_string();
    let server = HttpServer::new(config);
    let admin = setup_admin_router(server.state().clone());

    let denied = admin
        .clone()
        .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = admin
        .oneshot(
            Request::builder()
                .uri("/admin/filters")
                .header("Authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    let filters: serde_json::Value = serde_json::from_str(&body_text(allowed).await).unwrap();
    let names: Vec<&str> = filters
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"inbound.RouteFilter"));
    assert!(names.contains(&"endpoint.ProxyEndpoint"));
}
