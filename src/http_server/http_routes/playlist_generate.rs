use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::http_server::bearer::require_request_user;
use crate::http_server::error::Report;
use crate::http_server::state::AppState;
use crate::services::generator::SuggestionOptions;

#[derive(Debug, Deserialize)]
pub struct GenerateSuggestionsBody {
    pub prompt: String,
    #[serde(default)]
    pub options: Option<SuggestionOptions>,
}

#[derive(Debug, Serialize)]
pub struct GenerateSuggestionsResponse {
    pub content: String,
}

/// Server-side proxy for the completion API so clients never hold its key.
pub async fn generate_suggestions(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<GenerateSuggestionsBody>,
) -> Result<Json<GenerateSuggestionsResponse>, Report> {
    let user = require_request_user(&app_state, &headers).await?;
    log::debug!("Suggestion request from user {}", user.id);

    let content = app_state
        .generator
        .suggest(&body.prompt, body.options.unwrap_or_default())
        .await?;

    Ok(Json(GenerateSuggestionsResponse { content }))
}
