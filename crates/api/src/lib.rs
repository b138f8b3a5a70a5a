//! HTTP API server for the storefront order service.
//!
//! Provides REST endpoints for checkout, order management, the catalog and
//! guest verification, with structured logging (tracing) and Prometheus
//! metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    GuestSessions, GuestVerifier, InMemoryGuestVerifier, InMemoryPaymentGateway, LogNotifier,
    OrderSaga,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/mine", get(routes::orders::mine::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", put(routes::orders::pay::<S>))
        .route("/orders/{id}/deliver", put(routes::orders::deliver::<S>))
        .route("/orders/{id}/seen", put(routes::orders::seen::<S>))
        .route(
            "/products",
            post(routes::products::create::<S>).get(routes::products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).put(routes::products::replace::<S>),
        )
        .route("/guest/otp", post(routes::guest::request_code::<S>))
        .route("/guest/verify", post(routes::guest::verify::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with the in-memory gateway and verifier.
pub fn create_default_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    let verifier: Arc<dyn GuestVerifier> = Arc::new(InMemoryGuestVerifier::new());
    create_state(store, verifier, config)
}

/// Creates the application state around a given verifier.
pub fn create_state<S: Store>(
    store: S,
    verifier: Arc<dyn GuestVerifier>,
    config: &Config,
) -> Arc<AppState<S>> {
    let saga = OrderSaga::new(store, InMemoryPaymentGateway::new(), LogNotifier)
        .with_currency(config.currency.clone());

    Arc::new(AppState {
        saga,
        guest_sessions: GuestSessions::new(config.guest_session_ttl()),
        verifier,
        admin_key: config.admin_api_key.clone(),
    })
}
