//! Collection management endpoints

use axum::{
    extract::{Path, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collection::Activation;
use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::ChatMessage;

/// Form body naming a collection
#[derive(Debug, Deserialize)]
pub struct CollectionForm {
    pub saved_name: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub chat: Vec<ChatMessage>,
}

/// GET /collections
pub async fn list_collections(State(state): State<AppState>) -> Result<Json<CollectionsResponse>> {
    let collections = state.collections().list()?;
    Ok(Json(CollectionsResponse { collections }))
}

/// POST /activate
pub async fn activate_collection(
    State(state): State<AppState>,
    Form(form): Form<CollectionForm>,
) -> Result<Json<Activation>> {
    let activation = state.collections().activate(&form.saved_name).await?;
    Ok(Json(activation))
}

/// DELETE /collections/:saved_name
pub async fn delete_collection(
    State(state): State<AppState>,
    Path(saved_name): Path<String>,
) -> Json<Value> {
    let deleted = state.collections().delete(&saved_name).await;
    Json(json!({ "deleted": deleted }))
}

/// POST /clear_chat
pub async fn clear_chat(
    State(state): State<AppState>,
    Form(form): Form<CollectionForm>,
) -> Result<Json<Value>> {
    state.collections().clear_chat(&form.saved_name).await?;
    Ok(Json(json!({ "cleared": true })))
}

/// GET /chat/:saved_name
pub async fn get_chat(
    State(state): State<AppState>,
    Path(saved_name): Path<String>,
) -> Result<Json<ChatResponse>> {
    let chat = state.collections().chat(&saved_name)?;
    Ok(Json(ChatResponse { chat }))
}
