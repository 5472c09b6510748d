use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/series", get(handlers::get_series))
        .route("/api/locations/{location_id}", get(handlers::get_location))
        .route("/api/health", get(handlers::get_health))
        .with_state(state)
}
