use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// POST /chat/ — answer one user question.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request("invalid request body"))?;

    if request.message.is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }
    if request.user.is_empty() {
        return Err(ApiError::bad_request("user is required"));
    }

    info!("Chat request from {}", request.user);
    let response = state.chat.chat(&request.message, &request.user).await?;

    Ok(Json(ChatResponse { response }))
}
