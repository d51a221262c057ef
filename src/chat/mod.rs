//! Chat pipeline: history load, query rewrite with rejection, semantic
//! answer cache, and tool-using generation on a miss.

pub mod cache;
pub mod prompts;
pub mod tools;

pub use cache::{AnswerCache, CachedAnswer};
pub use tools::ToolRegistry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::history::{ChatHistory, ChatMessage, Role};
use crate::llm::{ChatModel, ChatRequest, Embedder, Message, StructuredRequest};

use prompts::{REWRITE_PROMPT, SYSTEM_PROMPT};

/// Maximum rounds of tool calling before forcing a final response.
const MAX_TOOL_ROUNDS: usize = 5;

/// Overall timeout for the generation loop.
const TOOL_LOOP_TIMEOUT: Duration = Duration::from_secs(120);

/// Rewrite verdict from the fast model.
#[derive(Debug, Clone, Deserialize)]
struct RewriteResult {
    /// Rewritten standalone query (empty if rejected).
    #[serde(default)]
    prompt: String,
    /// True if the turn is abusive or not an informational question.
    #[serde(default)]
    rejected: bool,
    #[serde(default)]
    reason: String,
}

pub struct ChatService {
    model: Arc<dyn ChatModel>,
    fast: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    cache: AnswerCache,
    history: Arc<dyn ChatHistory>,
    tools: ToolRegistry,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn ChatModel>,
        fast: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        cache: AnswerCache,
        history: Arc<dyn ChatHistory>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            model,
            fast,
            embedder,
            cache,
            history,
            tools,
        }
    }

    /// Answer one user turn.
    pub async fn chat(&self, question: &str, user: &str) -> Result<String, ChatError> {
        let history = match self.history.get(user).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load chat history for {}: {:#}", user, e);
                Vec::new()
            }
        };

        let rewritten = self.rewrite(&history, question).await;

        if rewritten.rejected {
            info!("Rejected question from {}: {}", user, rewritten.reason);
            return Ok(format!("I am unable to answer you: {}", rewritten.reason));
        }

        // Legacy contract: the rewritten prompt is always the embedding and
        // cache key, but the generator sees the original question whenever
        // history informed the rewrite.
        let effective_query = if history.is_empty() {
            rewritten.prompt.as_str()
        } else {
            question
        };

        let embedding = self
            .embedder
            .embed(
                std::slice::from_ref(&rewritten.prompt),
                Some(self.cache.dimensions()),
            )
            .await
            .map_err(ChatError::Embedding)?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding(anyhow!("embedder returned no vectors")))?;

        if let Some(cached) = self
            .cache
            .lookup(effective_query, &embedding)
            .await
            .map_err(ChatError::Store)?
        {
            debug!("Answer cache hit for {}", user);
            self.append_history(user, question, &cached.answer).await;
            return Ok(cached.answer);
        }

        let answer = self.generate(effective_query).await?;

        if let Err(e) = self
            .cache
            .store(&rewritten.prompt, embedding, &answer)
            .await
        {
            warn!("Failed to store answer in cache: {:#}", e);
        }
        self.append_history(user, question, &answer).await;

        Ok(answer)
    }

    /// Rewrite the question into a standalone form, resolving references
    /// from history. A failed rewrite falls back to the original question
    /// rather than failing the turn.
    async fn rewrite(&self, history: &[ChatMessage], question: &str) -> RewriteResult {
        let mut messages: Vec<Message> = history
            .iter()
            .map(|msg| match msg.role {
                Role::User => Message::User {
                    content: msg.text.clone(),
                },
                Role::Model => Message::Assistant {
                    content: Some(msg.text.clone()),
                    tool_calls: Vec::new(),
                },
            })
            .collect();
        messages.push(Message::User {
            content: question.to_string(),
        });

        let request = StructuredRequest {
            system: REWRITE_PROMPT.to_string(),
            messages,
            schema_name: "rewrite".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "rejected": {"type": "boolean"},
                    "reason": {"type": "string"},
                },
                "required": ["prompt", "rejected", "reason"],
                "additionalProperties": false,
            }),
        };

        match self.fast.complete_structured(request).await {
            Ok(value) => match serde_json::from_value::<RewriteResult>(value) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Rewrite returned malformed verdict, using original: {}", e);
                    RewriteResult {
                        prompt: question.to_string(),
                        rejected: false,
                        reason: String::new(),
                    }
                }
            },
            Err(e) => {
                warn!("Rewrite failed, using original question: {:#}", e);
                RewriteResult {
                    prompt: question.to_string(),
                    rejected: false,
                    reason: String::new(),
                }
            }
        }
    }

    /// Tool-using generation: keep executing requested tools and feeding
    /// their results back until the model answers in text, with a bounded
    /// number of rounds and a final forced no-tools call.
    async fn generate(&self, query: &str) -> Result<String, ChatError> {
        tokio::time::timeout(TOOL_LOOP_TIMEOUT, self.generate_inner(query))
            .await
            .map_err(|_| {
                ChatError::Llm(anyhow!(
                    "tool loop timed out after {}s",
                    TOOL_LOOP_TIMEOUT.as_secs()
                ))
            })?
    }

    async fn generate_inner(&self, query: &str) -> Result<String, ChatError> {
        let mut messages = vec![Message::User {
            content: query.to_string(),
        }];

        for round in 0..MAX_TOOL_ROUNDS {
            let response = self
                .model
                .complete(ChatRequest {
                    system: SYSTEM_PROMPT.to_string(),
                    messages: messages.clone(),
                    tools: self.tools.specs(),
                })
                .await
                .map_err(ChatError::Llm)?;

            if response.tool_calls.is_empty() {
                debug!("Generation complete after {} round(s)", round + 1);
                return Ok(response.text().to_string());
            }

            debug!(
                "Round {}: model requested {} tool call(s): {:?}",
                round + 1,
                response.tool_calls.len(),
                response.tool_calls.iter().map(|c| &c.name).collect::<Vec<_>>()
            );

            messages.push(Message::Assistant {
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            });

            for call in &response.tool_calls {
                let output = self.tools.execute(call).await;
                messages.push(Message::Tool {
                    call_id: call.id.clone(),
                    content: output,
                });
            }
        }

        warn!("Hit max tool rounds ({}), forcing final response", MAX_TOOL_ROUNDS);
        let response = self
            .model
            .complete(ChatRequest {
                system: SYSTEM_PROMPT.to_string(),
                messages,
                tools: Vec::new(),
            })
            .await
            .map_err(ChatError::Llm)?;
        Ok(response.text().to_string())
    }

    async fn append_history(&self, user: &str, question: &str, answer: &str) {
        let turn = [ChatMessage::user(question), ChatMessage::model(answer)];
        if let Err(e) = self.history.append(user, &turn).await {
            warn!("Failed to append chat history for {}: {:#}", user, e);
        }
    }
}
