//! Core error taxonomy shared by the ingestion and chat pipelines.
//!
//! Infrastructure clients (qdrant, sqlx, redis, reqwest) speak `anyhow`
//! with context; the pipelines wrap those into the variants below at the
//! point where the failure class matters to a caller.

use thiserror::Error;

/// Failures of a single ingestion event.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("upstream fetch failed for {doc_type} {id}: {cause:#}")]
    UpstreamFetch {
        doc_type: String,
        id: String,
        cause: anyhow::Error,
    },

    #[error("upstream record for {doc_type} {id} could not be decoded: {cause:#}")]
    UpstreamDecode {
        doc_type: String,
        id: String,
        cause: anyhow::Error,
    },

    /// Defensive invariant: the projection rendered nothing worth embedding.
    #[error("empty projection for {0}")]
    EmptyProjection(String),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// Defensive invariant: the embedder returned an empty batch.
    #[error("embedding service returned no vectors")]
    NoEmbeddings,

    /// Ledger or vector index failure. The ledger transaction has been
    /// rolled back by the time this surfaces.
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
}

/// Failures of a single chat turn. A rejected question is not an error;
/// it is answered politely by the pipeline itself.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("model generation failed: {0:#}")]
    Llm(anyhow::Error),

    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
}

/// Failures talking to the upstream domain API, split so ingestion can
/// report fetch and decode classes separately.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("response decode failed: {0:#}")]
    Decode(anyhow::Error),
}
