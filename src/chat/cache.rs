//! Two-threshold semantic answer cache with LLM adjudication.
//!
//! Hits come in two flavours: a near-exact embedding match taken on score
//! alone, and a band of close-but-ambiguous candidates a fast model
//! adjudicates. Adjudication failures degrade to a miss, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm::{ChatModel, Message, StructuredRequest};
use crate::vector::{Filter, Point, VectorIndex};

use super::prompts::CACHE_VALIDATION_PROMPT;

const SCORE_THRESHOLD: f32 = 0.75;
const HEURISTIC_SCORE_THRESHOLD: f32 = 0.98;
const TOP_N: usize = 5;
const ANSWER_MAX_LEN: usize = 200;

pub const PAYLOAD_TYPE_CACHE: &str = "qa_cache";

/// A cached question/answer pair reconstructed from a vector point.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnswer {
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Adjudicator verdict over the candidate list.
#[derive(Debug, Deserialize)]
struct CacheValidation {
    match_index: i64,
    #[serde(default)]
    reason: String,
}

pub struct AnswerCache {
    index: Arc<dyn VectorIndex>,
    fast: Arc<dyn ChatModel>,
}

impl AnswerCache {
    pub fn new(index: Arc<dyn VectorIndex>, fast: Arc<dyn ChatModel>) -> Self {
        Self { index, fast }
    }

    /// Vector width of the cache collection; question embeddings must match.
    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// Look the question up. `Ok(None)` is a miss; errors are index
    /// failures only — adjudication problems degrade to a miss.
    pub async fn lookup(&self, question: &str, embedding: &[f32]) -> Result<Option<CachedAnswer>> {
        let results = self
            .index
            .search(
                embedding.to_vec(),
                TOP_N,
                Some(Filter::must_match("type", PAYLOAD_TYPE_CACHE)),
            )
            .await?;

        let mut candidates = Vec::new();
        for result in results {
            let Some(entry) = decode_entry(&result.payload) else {
                continue;
            };
            if result.score >= HEURISTIC_SCORE_THRESHOLD {
                debug!("Cache hit at {:.3} (near-exact): {}", result.score, entry.question);
                return Ok(Some(entry));
            }
            if result.score >= SCORE_THRESHOLD {
                candidates.push(entry);
            }
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        Ok(self.adjudicate(question, candidates).await)
    }

    /// Ask the fast model to pick the candidate that actually answers the
    /// query, or decline. Any failure here is a miss.
    async fn adjudicate(
        &self,
        question: &str,
        candidates: Vec<CachedAnswer>,
    ) -> Option<CachedAnswer> {
        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{}. Q: {}\n   A: {}",
                    i,
                    c.question,
                    truncate(&c.answer, ANSWER_MAX_LEN)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let request = StructuredRequest {
            system: CACHE_VALIDATION_PROMPT.to_string(),
            messages: vec![Message::User {
                content: format!("User query: {}\n\nCached entries:\n{}", question, listing),
            }],
            schema_name: "cache_validation".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "match_index": {"type": "integer"},
                    "reason": {"type": "string"},
                },
                "required": ["match_index", "reason"],
                "additionalProperties": false,
            }),
        };

        let verdict = match self.fast.complete_structured(request).await {
            Ok(value) => match serde_json::from_value::<CacheValidation>(value) {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("Cache adjudication returned malformed verdict: {}", e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Cache adjudication failed, treating as miss: {}", e);
                return None;
            }
        };

        let index = usize::try_from(verdict.match_index).ok()?;
        let chosen = candidates.into_iter().nth(index)?;
        debug!("Cache hit by adjudication ({}): {}", verdict.reason, chosen.question);
        Some(chosen)
    }

    /// Write-through after a generation. Failures are the caller's to log.
    pub async fn store(&self, question: &str, embedding: Vec<f32>, answer: &str) -> Result<()> {
        let payload: HashMap<String, Value> = [
            ("type".to_string(), Value::from(PAYLOAD_TYPE_CACHE)),
            ("question".to_string(), Value::from(question)),
            ("answer".to_string(), Value::from(answer)),
            ("created_at".to_string(), Value::from(Utc::now().timestamp())),
        ]
        .into();

        self.index
            .upsert(vec![Point {
                id: Uuid::now_v7(),
                vector: embedding,
                payload,
            }])
            .await
    }
}

fn decode_entry(payload: &HashMap<String, Value>) -> Option<CachedAnswer> {
    let question = payload.get("question")?.as_str()?.to_string();
    let answer = payload.get("answer")?.as_str()?.to_string();
    let created_at = payload
        .get("created_at")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default();
    Some(CachedAnswer {
        question,
        answer,
        created_at,
    })
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len).collect();
    format!("{}...", truncated)
}
