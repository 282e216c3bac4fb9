//! Router construction and shared handler state.
//!
//! Kept out of `main` so integration tests can build the exact same router
//! over any [`Store`] implementation.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, store::Store};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,

    /// Age after which a `processing` log entry is reported as stuck
    pub stale_after: chrono::Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, stale_after: chrono::Duration) -> Self {
        Self { store, stale_after }
    }
}

/// Build the HTTP router.
///
/// # Routes
///
/// - `GET /health` (public)
/// - `POST /webhooks/{platform}` (public, authenticated by platform secret)
/// - `/api/v1/...` tenant admin API (API key)
pub fn router(state: AppState) -> Router {
    // Tenant admin routes
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/webhook-events",
            get(handlers::event_log::list_events),
        )
        .route(
            "/api/v1/webhook-events/stale",
            get(handlers::event_log::list_stale_events),
        )
        .route(
            "/api/v1/webhook-events/{id}",
            get(handlers::event_log::get_event),
        )
        .route(
            "/api/v1/webhook-events/{id}/replay",
            post(handlers::event_log::replay_event),
        )
        .route(
            "/api/v1/deals/by-external-id/{platform}/{external_id}",
            get(handlers::deals::get_deal_by_external_id),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Platforms authenticate with their own shared secret, not an API key
        .route(
            "/webhooks/{platform}",
            post(handlers::webhooks::receive_webhook),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
