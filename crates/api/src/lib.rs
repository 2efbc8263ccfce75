//! Alertbridge API Server
//!
//! Accepts push notifications on `POST /message`, authenticates the sending
//! app by token, and forwards each message to Alertmanager as an alert.

use alerting::AlertBuilder;
use axum::extract::DefaultBodyLimit;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use delivery::{AlertClient, DeliveryError};
use ingest::AppRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod forwarder;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod server;

pub use crate::config::Settings;
pub use crate::error::ApiError;
pub use crate::forwarder::{ForwardError, Forwarded, Forwarder, ForwardingIds};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Token table, read-only after startup
    pub registry: Arc<AppRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub metrics: PrometheusHandle,
    /// Deadline applied to each request's delivery work
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        registry: AppRegistry,
        forwarder: Forwarder,
        metrics: PrometheusHandle,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            forwarder: Arc::new(forwarder),
            metrics,
            request_timeout,
        }
    }

    /// Wire the state from validated settings
    pub fn from_settings(settings: &Settings, metrics: PrometheusHandle) -> Result<Self, DeliveryError> {
        let client = AlertClient::new(settings.alertmanager.client_config())?;
        let forwarder = Forwarder::new(
            AlertBuilder::new(settings.defaults.clone()),
            client,
            Arc::new(ForwardingIds::new()),
            settings.alertmanager.timeout,
        );

        Ok(Self::new(
            settings.registry(),
            forwarder,
            metrics,
            settings.server.request_timeout,
        ))
    }
}

/// Create the application router
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/message", post(routes::message::post_message))
        .route("/healthz", get(routes::health::healthz))
        .route("/readyz", get(routes::health::readyz))
        .route("/metrics", get(routes::health::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics::track_requests))
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(state)
}
