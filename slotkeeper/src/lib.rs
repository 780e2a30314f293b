//! Short-lived reservations against activity slots.
//!
//! A caller provisionally holds a quantity of an activity slot. The hold lapses
//! after a fixed timeout unless it is committed first, and subscribers for the
//! reservation's context are notified when it lapses.
//!
//! - **[`storage`]**: authoritative map of active reservations; its `remove` decides
//!   whether a commit or an expiry wins
//! - **[`timer`]**: one-shot cancellable timers on the tokio runtime
//! - **[`notifier`]**: broadcast of expiry events, filtered per subscriber by context
//! - **[`manager`]**: the public operations built from the above
//! - **[`api`]**: HTTP surface, with expiries streamed as Server-Sent Events
//!
//! # Example
//! ```ignore
//! use slotkeeper::ReserveManager;
//!
//! let manager = ReserveManager::in_memory(Duration::from_secs(600), 1024);
//! let expired = manager.subscribe_expiry("session-1");
//!
//! let reservation = manager.create_reserve("session-1".to_string(), 101, 1)?;
//! let committed = manager.commit_reserve(&reservation.reserve_id)?;
//! ```

use std::sync::OnceLock;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};

pub mod api;
pub mod config;
pub mod errors;
pub mod manager;
pub mod notifier;
pub mod reserve;
pub mod storage;
pub mod telemetry;
pub mod timer;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use errors::{Error, Result};
pub use manager::ReserveManager;
pub use notifier::ExpiryNotifier;
pub use reserve::{Reservation, ReserveExpired, ReserveId, ReserveStatus};
pub use storage::{Storage, in_memory::InMemoryStorage};
pub use timer::{TimerHandle, TimerService};

use crate::config::CorsOrigin;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: ReserveManager,
    pub config: Config,
}

impl AppState {
    /// Build the reservation manager described by `config`.
    pub fn from_config(config: Config) -> Self {
        let manager = ReserveManager::in_memory(config.reserve_timeout, config.notifications.capacity);
        Self { manager, config }
    }
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder on first use and return its handle.
///
/// Must be called before metrics are recorded, otherwise the `metrics` macros are no-ops.
pub fn get_or_install_prometheus_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!("A metrics recorder was already installed: {}", e);
            }
            handle
        })
        .clone()
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;

    let allow_origin = if origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send origins without a trailing slash.
                values.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Build the application router with all endpoints and middleware.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::reserves;

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/v1/reserves", post(reserves::create_reserve).get(reserves::list_reserves))
        .route("/api/v1/reserves/expired", get(reserves::stream_expired))
        .route("/api/v1/reserves/{reserve_id}", get(reserves::get_reserve))
        .route("/api/v1/reserves/{reserve_id}/commit", post(reserves::commit_reserve))
        .with_state(state.clone());

    if state.config.enable_metrics {
        let handle = get_or_install_prometheus_handle();
        router = router.route("/internal/metrics", get(move || async move { handle.render() }));
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The runnable service: router plus the reservation state behind it.
///
/// Reservations are in memory only; shutting the application down drops every
/// active reservation without publishing expiries.
pub struct Application {
    router: Router,
    app_state: AppState,
}

impl Application {
    /// Create a new application instance from configuration
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting slotkeeper with configuration: {:#?}", config);

        let app_state = AppState::from_config(config);
        let router = build_router(&app_state)?;

        Ok(Self { router, app_state })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, AppState) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.app_state)
    }

    /// Start serving the application until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let config = &self.app_state.config;
        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            reserve_timeout = ?self.app_state.manager.timeout(),
            "Slotkeeper listening on http://{}, available at http://localhost:{}",
            bind_addr,
            config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        let abandoned = self.app_state.manager.list_reserves().len();
        info!(abandoned, "Server stopped, dropping active reservations");

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
