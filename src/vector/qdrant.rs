//! Qdrant-backed implementation of [`VectorIndex`].

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter as QdrantFilter, ListValue, PointId, PointStruct, SearchPointsBuilder, Struct,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Filter, MatchValue, Point, SearchResult, VectorIndex};

/// One named collection on a shared Qdrant connection.
pub struct QdrantIndex {
    client: Arc<Qdrant>,
    collection: String,
    dimensions: usize,
}

impl QdrantIndex {
    pub fn new(client: Arc<Qdrant>, collection: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            collection: collection.into(),
            dimensions,
        }
    }
}

/// Create the collection with cosine distance if it does not exist yet.
/// A concurrent creation by another process is not an error.
pub async fn ensure_collection(client: &Qdrant, collection: &str, dimensions: usize) -> Result<()> {
    let exists = client
        .collection_exists(collection)
        .await
        .context("check collection exists")?;
    if exists {
        return Ok(());
    }

    info!("Creating Qdrant collection: {}", collection);
    match client
        .create_collection(
            CreateCollectionBuilder::new(collection)
                .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
        )
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("already exists") => {
            debug!("Collection {} created by another process", collection);
            Ok(())
        }
        Err(e) => Err(e).context(format!("create collection: {}", collection)),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, points: Vec<Point>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload: HashMap<String, QdrantValue> = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_to_value(v)))
                    .collect();
                PointStruct::new(p.id.to_string(), p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .context("upsert points")?;
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Filter>,
    ) -> Result<Vec<SearchResult>> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true);
        if let Some(filter) = filter.and_then(build_filter) {
            builder = builder.filter(filter);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .context("search points")?;

        let results = response
            .result
            .into_iter()
            .map(|p| SearchResult {
                id: p
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|opts| match opts {
                        qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
                        qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
                    })
                    .unwrap_or_default(),
                score: p.score,
                payload: p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, value_to_json(v)))
                    .collect(),
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, filter: Filter) -> Result<()> {
        let Some(filter) = build_filter(filter) else {
            return Ok(());
        };

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .context("delete points by filter")?;
        Ok(())
    }

    async fn delete_by_id(&self, ids: Vec<Uuid>) -> Result<()> {
        let ids: Vec<PointId> = ids.into_iter().map(|id| id.to_string().into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(ids)
                    .wait(true),
            )
            .await
            .context("delete points by id")?;
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Translate the domain filter. Returns `None` when every partition is
/// empty so deletes can no-op instead of matching the whole collection.
fn build_filter(filter: Filter) -> Option<QdrantFilter> {
    if filter.is_empty() {
        return None;
    }

    let condition = |m: super::FieldMatch| match m.value {
        MatchValue::Text(v) => Condition::matches(m.field, v),
        MatchValue::Integer(v) => Condition::matches(m.field, v),
        MatchValue::Boolean(v) => Condition::matches(m.field, v),
    };

    Some(QdrantFilter {
        must: filter.must.into_iter().map(condition).collect(),
        should: filter.should.into_iter().map(condition).collect(),
        must_not: filter.must_not.into_iter().map(condition).collect(),
        ..Default::default()
    })
}

fn json_to_value(v: Value) -> QdrantValue {
    let kind = match v {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_value).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn value_to_json(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_builds_to_none() {
        assert!(build_filter(Filter::default()).is_none());
    }

    #[test]
    fn filter_partitions_map_to_qdrant_conditions() {
        let filter = Filter {
            must: vec![super::super::FieldMatch::text("reference", "pokemon_25")],
            should: vec![super::super::FieldMatch {
                field: "generation".into(),
                value: MatchValue::Integer(1),
            }],
            must_not: vec![super::super::FieldMatch {
                field: "legendary".into(),
                value: MatchValue::Boolean(true),
            }],
        };

        let built = build_filter(filter).unwrap();
        assert_eq!(built.must.len(), 1);
        assert_eq!(built.should.len(), 1);
        assert_eq!(built.must_not.len(), 1);
    }

    #[test]
    fn json_value_roundtrip() {
        let original = json!({
            "reference": "pokemon_25",
            "count": 3,
            "score": 0.5,
            "tags": ["electric", "mouse"],
            "nested": {"ok": true},
        });

        let roundtripped = value_to_json(json_to_value(original.clone()));
        assert_eq!(roundtripped, original);
    }
}
