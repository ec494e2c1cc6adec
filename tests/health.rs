//! Health checker tests against a real HTTP endpoint.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use modqueue::config::ServiceSpec;
use modqueue::supervisor::{Health, HealthProbe, HttpHealthChecker};

/// Serve `router` on an ephemeral port, returning the port
async fn serve(router: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

fn spec(port: u16) -> ServiceSpec {
    ServiceSpec {
        name: "probe-target".to_string(),
        command: "unused".to_string(),
        args: Vec::new(),
        port,
        health_path: "/health".to_string(),
    }
}

#[tokio::test]
async fn ok_endpoint_is_healthy() {
    let port = serve(Router::new().route("/health", get(|| async { StatusCode::OK }))).await;
    let checker = HttpHealthChecker::new(Duration::from_secs(1)).unwrap();
    assert_eq!(checker.probe(&spec(port)).await, Health::Healthy);
}

#[tokio::test]
async fn error_endpoint_is_unhealthy() {
    let port = serve(Router::new().route(
        "/health",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    ))
    .await;
    let checker = HttpHealthChecker::new(Duration::from_secs(1)).unwrap();
    assert_eq!(checker.probe(&spec(port)).await, Health::Unhealthy);
}

#[tokio::test]
async fn missing_route_is_unhealthy_not_unreachable() {
    // The server answers 404; that is a live but broken service
    let port = serve(Router::new().route("/other", get(|| async { StatusCode::OK }))).await;
    let checker = HttpHealthChecker::new(Duration::from_secs(1)).unwrap();
    assert_eq!(checker.probe(&spec(port)).await, Health::Unhealthy);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let checker = HttpHealthChecker::new(Duration::from_secs(1)).unwrap();
    assert_eq!(checker.probe(&spec(port)).await, Health::Unreachable);
}
