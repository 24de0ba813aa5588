//! HTTP surface: health probes plus the `/api/v1` resources.

pub mod actions;
pub mod events;
pub mod health;
pub mod incidents;
pub mod playbooks;
pub mod rules;
pub mod stats;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Largest accepted request body (raw event payloads included).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let event_routes = Router::new()
        .route("/events", get(events::list).post(events::create))
        .route("/events/{id}", get(events::get_by_id));

    let incident_routes = Router::new()
        .route("/incidents", get(incidents::list))
        .route(
            "/incidents/{id}",
            get(incidents::get_by_id).patch(incidents::update),
        )
        .route("/incidents/{id}/resolve", post(incidents::resolve));

    let definition_routes = Router::new()
        .route("/rules", get(rules::list))
        .route("/rules/reload", post(rules::reload))
        .route("/playbooks", get(playbooks::list))
        .route("/playbooks/reload", post(playbooks::reload))
        .route("/playbooks/{id}", get(playbooks::get_by_id))
        .route("/playbooks/{id}/execute", post(playbooks::execute));

    let api = Router::new()
        .merge(event_routes)
        .merge(incident_routes)
        .merge(definition_routes)
        .route("/actions", get(actions::list))
        .route("/stats", get(stats::get));

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/api/v1", api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
