//! Language-model and embedding clients.
//!
//! The chat pipeline talks to two models through the same [`ChatModel`]
//! contract: the primary model for tool-using generation and a fast model
//! for query rewriting and cache adjudication.

pub mod embeddings;
pub mod openai;

pub use embeddings::{Embedder, OpenAiEmbedder};
pub use openai::OpenAiChatModel;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A function tool offered to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn of model-visible conversation state. The tool loop appends
/// assistant turns (with their tool calls) and tool results as it runs.
#[derive(Debug, Clone)]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

/// Free-form generation request, optionally with tools bound.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

/// Terminal or tool-requesting model output.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatCompletion {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Structured-output request; the response must conform to `schema`.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub schema_name: String,
    pub schema: Value,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, req: ChatRequest) -> Result<ChatCompletion>;

    /// Generate a JSON document conforming to the request schema.
    async fn complete_structured(&self, req: StructuredRequest) -> Result<Value>;
}
