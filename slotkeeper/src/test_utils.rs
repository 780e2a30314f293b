use std::net::SocketAddr;
use std::time::Duration;

use axum_test::TestServer;
use tokio::net::TcpListener;

use crate::{AppState, Application, Config, build_router};

pub fn create_test_config(reserve_timeout: Duration) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        reserve_timeout,
        enable_metrics: false,
        ..Default::default()
    }
}

/// In-memory application behind an axum-test server, metrics disabled.
pub fn create_test_server(reserve_timeout: Duration) -> (TestServer, AppState) {
    Application::new(create_test_config(reserve_timeout))
        .expect("Failed to create application")
        .into_test_server()
}

/// Serve the router on an ephemeral local port, for clients that need a real
/// connection such as long-lived event streams.
pub async fn spawn_http_server(reserve_timeout: Duration) -> (SocketAddr, AppState) {
    let state = AppState::from_config(create_test_config(reserve_timeout));
    let router = build_router(&state).expect("Failed to build router");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move { axum::serve(listener, router).await });

    (addr, state)
}
