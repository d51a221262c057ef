use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::ingest::IngestionEvent;
use crate::state::AppState;

/// POST /ingest/ — accept one ingestion event. The same handler semantics
/// back the Kafka consumer; only the error surface differs.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestionEvent>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(event) = payload.map_err(|_| ApiError::bad_request("invalid request body"))?;

    info!("Ingest request: {} {}", event.doc_type, event.id);
    state.ingest.ingest(event).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))))
}
