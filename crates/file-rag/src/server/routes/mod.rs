//! API routes for the file-rag server

pub mod ask;
pub mod collections;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        // Upload with a larger body limit
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/collections", get(collections::list_collections))
        .route("/collections/:saved_name", delete(collections::delete_collection))
        .route("/activate", post(collections::activate_collection))
        .route("/clear_chat", post(collections::clear_chat))
        .route("/chat/:saved_name", get(collections::get_chat))
        .route("/ask", post(ask::ask))
}

/// GET / - liveness message
async fn root() -> Json<Value> {
    Json(json!({ "status": "API is running" }))
}
