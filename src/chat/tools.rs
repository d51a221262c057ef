//! Tools bound to the primary model: exact fetch by id and semantic search
//! over the corpus collection.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{Embedder, ToolCall, ToolSpec};
use crate::pokeapi::PokeApi;
use crate::vector::VectorIndex;

pub const TOOL_GET_BY_ID: &str = "getByID";
pub const TOOL_SEMANTIC_SEARCH: &str = "semanticSearch";

const DEFAULT_SEARCH_LIMIT: usize = 5;

pub struct ToolRegistry {
    api: Arc<dyn PokeApi>,
    embedder: Arc<dyn Embedder>,
    corpus: Arc<dyn VectorIndex>,
}

impl ToolRegistry {
    pub fn new(
        api: Arc<dyn PokeApi>,
        embedder: Arc<dyn Embedder>,
        corpus: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            api,
            embedder,
            corpus,
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: TOOL_GET_BY_ID.to_string(),
                description: "Fetches complete Pokemon data by ID or name. Returns exact stats \
                              (HP, attack, defense, speed, etc.), types, abilities, moves, \
                              height, and weight. Use this when you need precise details about \
                              a specific Pokemon."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": "Pokemon ID (e.g. '25') or name (e.g. 'pikachu')",
                        },
                    },
                    "required": ["id"],
                }),
            },
            ToolSpec {
                name: TOOL_SEMANTIC_SEARCH.to_string(),
                description: "Searches the Pokemon database using semantic similarity. Use for \
                              exploratory queries like finding Pokemon by type, abilities, \
                              characteristics, or conceptual similarities (e.g. 'fast electric \
                              Pokemon', 'tanky water types'). Returns ranked results with \
                              relevance scores."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Natural language search query describing the Pokemon you're looking for",
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Max results to return (default 5)",
                        },
                    },
                    "required": ["query"],
                }),
            },
        ]
    }

    /// Execute one tool call and render its result for the model. Failures
    /// are reported back to the model as an error object rather than
    /// failing the chat turn.
    pub async fn execute(&self, call: &ToolCall) -> String {
        debug!("Executing tool {} ({})", call.name, call.id);
        match self.dispatch(call).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                warn!("Tool {} failed: {:#}", call.name, e);
                json!({"error": e.to_string()}).to_string()
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<Value> {
        match call.name.as_str() {
            TOOL_GET_BY_ID => {
                let id = call
                    .arguments
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("missing required argument: id"))?;
                let record = self.api.get_pokemon(id).await?;
                serde_json::from_str(&record.raw_json).map_err(Into::into)
            }
            TOOL_SEMANTIC_SEARCH => {
                let query = call
                    .arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("missing required argument: query"))?;
                let limit = call
                    .arguments
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|l| l as usize)
                    .unwrap_or(DEFAULT_SEARCH_LIMIT);

                let embeddings = self
                    .embedder
                    .embed(&[query.to_string()], Some(self.corpus.dimensions()))
                    .await?;
                let embedding = embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("embedder returned no vectors"))?;

                let results = self.corpus.search(embedding, limit, None).await?;
                let rendered: Vec<Value> = results
                    .into_iter()
                    .map(|r| {
                        json!({
                            "id": r.id,
                            "score": r.score,
                            "payload": r.payload,
                        })
                    })
                    .collect();
                Ok(Value::Array(rendered))
            }
            other => Err(anyhow!("unknown tool: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    use crate::error::UpstreamError;
    use crate::pokeapi::Record;
    use crate::vector::{Filter, Point, SearchResult};

    struct StubApi;

    #[async_trait]
    impl PokeApi for StubApi {
        async fn get_pokemon(&self, id: &str) -> Result<Record, UpstreamError> {
            let metadata = json!({"name": "pikachu", "id": 25});
            Ok(Record {
                id: id.to_string(),
                identifier: "pikachu".into(),
                raw_json: metadata.to_string(),
                metadata: metadata.as_object().cloned().unwrap(),
            })
        }

        async fn get_move(&self, _id: &str) -> Result<Record, UpstreamError> {
            Err(UpstreamError::Fetch(anyhow!("not used")))
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(
            &self,
            _texts: &[String],
            dimensions: Option<usize>,
        ) -> Result<Vec<Vec<f32>>> {
            assert_eq!(dimensions, Some(4));
            Ok(vec![vec![0.1, 0.2, 0.3, 0.4]])
        }
    }

    #[derive(Default)]
    struct StubIndex {
        searches: Mutex<Vec<(usize, Option<Filter>)>>,
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn upsert(&self, _points: Vec<Point>) -> Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            limit: usize,
            filter: Option<Filter>,
        ) -> Result<Vec<SearchResult>> {
            self.searches.lock().unwrap().push((limit, filter));
            Ok(vec![SearchResult {
                id: "p1".into(),
                score: 0.9,
                payload: [("reference".to_string(), Value::from("pokemon_25"))].into(),
            }])
        }

        async fn delete(&self, _filter: Filter) -> Result<()> {
            Ok(())
        }

        async fn delete_by_id(&self, _ids: Vec<Uuid>) -> Result<()> {
            Ok(())
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    fn registry() -> (ToolRegistry, Arc<StubIndex>) {
        let index = Arc::new(StubIndex::default());
        (
            ToolRegistry::new(Arc::new(StubApi), Arc::new(StubEmbedder), index.clone()),
            index,
        )
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn get_by_id_returns_the_raw_record() {
        let (registry, _) = registry();
        let output = registry
            .execute(&call(TOOL_GET_BY_ID, json!({"id": "25"})))
            .await;
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["name"], "pikachu");
    }

    #[tokio::test]
    async fn semantic_search_embeds_and_searches_unfiltered() {
        let (registry, index) = registry();
        let output = registry
            .execute(&call(
                TOOL_SEMANTIC_SEARCH,
                json!({"query": "fast electric", "limit": 3}),
            ))
            .await;

        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["payload"]["reference"], "pokemon_25");

        let searches = index.searches.lock().unwrap();
        assert_eq!(*searches, vec![(3, None)]);
    }

    #[tokio::test]
    async fn semantic_search_defaults_the_limit() {
        let (registry, index) = registry();
        registry
            .execute(&call(TOOL_SEMANTIC_SEARCH, json!({"query": "bulky water"})))
            .await;
        assert_eq!(index.searches.lock().unwrap()[0].0, DEFAULT_SEARCH_LIMIT);
    }

    #[tokio::test]
    async fn failures_are_reported_to_the_model_not_raised() {
        let (registry, _) = registry();
        let output = registry.execute(&call("teleport", json!({}))).await;
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_arguments_become_tool_errors() {
        let (registry, _) = registry();
        let output = registry.execute(&call(TOOL_GET_BY_ID, json!({}))).await;
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("id"));
    }
}
