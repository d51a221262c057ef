//! Shared handler state: the two pipeline services, each internally
//! holding its concurrency-safe clients.

use std::sync::Arc;

use crate::chat::ChatService;
use crate::ingest::IngestService;

pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub chat: Arc<ChatService>,
}
