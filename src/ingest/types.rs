//! Ingestion domain types: document kinds, ledger rows, and the wire event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kafka topic carrying [`IngestionEvent`] records.
pub const TOPIC_INGESTION: &str = "ingestion";

/// Payload field holding the ledger join key on corpus points.
pub const PAYLOAD_REFERENCE: &str = "reference";

/// Payload field holding the document kind on corpus points.
pub const PAYLOAD_TYPE: &str = "type";

/// Enumerated kind of retrievable document. Adding a kind means extending
/// the ingest dispatch and the projection, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pokemon,
    Move,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pokemon => "pokemon",
            DocumentType::Move => "move",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pokemon" => Some(DocumentType::Pokemon),
            "move" => Some(DocumentType::Move),
            _ => None,
        }
    }

    /// Join key between the ledger and the corpus collection.
    pub fn reference(&self, external_id: &str) -> String {
        format!("{}_{}", self.as_str(), external_id)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row. Timestamps are server-assigned on upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document-change event, identical whether it arrives over HTTP or the
/// message log. The type stays a raw string so an unknown kind surfaces as
/// an unsupported-type failure instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
}
