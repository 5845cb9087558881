//! Question answering endpoint

use axum::{extract::State, Form, Json};
use serde::Deserialize;

use crate::collection::AskResponse;
use crate::error::Result;
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskForm {
    pub saved_name: String,
    pub question: String,
}

/// POST /ask - SQL answer for CSV collections, retrieval answer otherwise
pub async fn ask(
    State(state): State<AppState>,
    Form(form): Form<AskForm>,
) -> Result<Json<AskResponse>> {
    tracing::info!("Ask '{}': \"{}\"", form.saved_name, form.question);
    let response = state
        .collections()
        .ask(&form.saved_name, &form.question)
        .await?;
    Ok(Json(response))
}
