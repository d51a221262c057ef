use axum::Json;
use serde_json::{json, Value};

pub async fn hello() -> Json<Value> {
    Json(json!({"message": "Hello World"}))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
