//! Entity CRUD routes built from the resolved model.
//! Paths are parameterized; handlers resolve the endpoint by segment.

use crate::handlers::entity::{create, list, update};
use crate::state::AppState;
use axum::{routing::get, routing::patch, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route("/:path_segment/:id", patch(update))
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
        .with_state(state)
}
