use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all ledger endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/events",
            post(handler::append_handler).get(handler::search_handler),
        )
        .route("/v1/verify", get(handler::verify_handler))
        .route("/v1/export", get(handler::export_handler))
        .route("/v1/anchor", post(handler::anchor_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
