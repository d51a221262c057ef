//! Vector index abstraction over a named collection of embedding points.
//!
//! Two collections back the service: the corpus (document embeddings keyed
//! by reference) and the answer cache (question embeddings). Both are
//! served by the same [`VectorIndex`] contract so the cores stay unaware of
//! the wire protocol.

mod qdrant;

pub use qdrant::{ensure_collection, QdrantIndex};

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// One row in a vector collection.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// A ranked search hit with its stored payload.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// Scalar value an equality matcher can compare against.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

/// A single field-equality predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub value: MatchValue,
}

impl FieldMatch {
    pub fn text(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: MatchValue::Text(value.into()),
        }
    }
}

/// Conjunctive tri-partition of equality matchers. An empty filter matches
/// nothing for deletes and everything for searches; `VectorIndex::delete`
/// treats it as a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub must: Vec<FieldMatch>,
    pub should: Vec<FieldMatch>,
    pub must_not: Vec<FieldMatch>,
}

impl Filter {
    /// Filter with a single `must` equality predicate.
    pub fn must_match(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            must: vec![FieldMatch::text(field, value)],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent by point id.
    async fn upsert(&self, points: Vec<Point>) -> Result<()>;

    /// Cosine-similarity search, descending score, at most `limit` results.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Filter>,
    ) -> Result<Vec<SearchResult>>;

    /// Remove all points matching the filter. No-op on an empty filter.
    async fn delete(&self, filter: Filter) -> Result<()>;

    async fn delete_by_id(&self, ids: Vec<Uuid>) -> Result<()>;

    /// Advertised vector width of the backing collection.
    fn dimensions(&self) -> usize;
}
