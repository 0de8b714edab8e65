//! API routes for the export server

pub mod dataset;

use axum::{routing::get, Router};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/generate-dataset", get(dataset::generate_dataset))
}
