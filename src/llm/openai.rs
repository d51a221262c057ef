//! OpenAI-compatible chat-completions client with function tools and
//! JSON-schema structured output.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatCompletion, ChatModel, ChatRequest, Message, StructuredRequest, ToolCall};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// How many times a structured response is requested before giving up on
/// getting parseable JSON back.
const STRUCTURED_ATTEMPTS: u32 = 2;

pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn call(&self, body: Value) -> Result<WireMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion error {}: {}", status, error_text));
        }

        let completion: WireCompletion = response
            .json()
            .await
            .context("decode chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))
    }

    fn wire_messages(system: &str, messages: &[Message]) -> Vec<Value> {
        let mut wire = vec![json!({"role": "system", "content": system})];
        for msg in messages {
            wire.push(match msg {
                Message::User { content } => json!({"role": "user", "content": content}),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    if calls.is_empty() {
                        json!({"role": "assistant", "content": content})
                    } else {
                        json!({"role": "assistant", "content": content, "tool_calls": calls})
                    }
                }
                Message::Tool { call_id, content } => {
                    json!({"role": "tool", "tool_call_id": call_id, "content": content})
                }
            });
        }
        wire
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, req: ChatRequest) -> Result<ChatCompletion> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(&req.system, &req.messages),
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        debug!("Chat request: model={}, tools={}", self.model, req.tools.len());

        let message = self.call(body).await?;
        message.into_completion()
    }

    async fn complete_structured(&self, req: StructuredRequest) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": Self::wire_messages(&req.system, &req.messages),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": req.schema_name,
                    "strict": true,
                    "schema": req.schema,
                },
            },
        });

        // Providers occasionally ignore the response format and return
        // prose; one retry before the caller degrades.
        let mut last_err = None;
        for attempt in 0..STRUCTURED_ATTEMPTS {
            if attempt > 0 {
                debug!("Retrying structured completion (attempt {})", attempt + 1);
            }
            let message = self.call(body.clone()).await?;
            let content = message.content.unwrap_or_default();
            match parse_json_content(&content) {
                Ok(value) => return Ok(value),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("structured completion returned nothing")))
    }
}

#[derive(Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

impl WireMessage {
    fn into_completion(self) -> Result<ChatCompletion> {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|c| {
                let arguments: Value = serde_json::from_str(&c.function.arguments)
                    .with_context(|| format!("parse arguments of tool call {}", c.function.name))?;
                Ok(ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ChatCompletion {
            content: self.content,
            tool_calls,
        })
    }
}

/// Strict JSON parse of model output, tolerating a markdown code fence.
fn parse_json_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(stripped).context("parse structured response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_start_with_system() {
        let messages = vec![Message::User {
            content: "hello".into(),
        }];
        let wire = OpenAiChatModel::wire_messages("be brief", &messages);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "be brief");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments_as_strings() {
        let messages = vec![Message::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "getByID".into(),
                arguments: json!({"id": "25"}),
            }],
        }];
        let wire = OpenAiChatModel::wire_messages("", &messages);
        let call = &wire[1]["tool_calls"][0];
        assert_eq!(call["function"]["name"], "getByID");
        assert_eq!(call["function"]["arguments"], r#"{"id":"25"}"#);
    }

    #[test]
    fn completion_parses_tool_call_arguments() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "semanticSearch", "arguments": "{\"query\":\"fast electric\",\"limit\":3}"}
                    }]
                }
            }]
        }"#;
        let completion: WireCompletion = serde_json::from_str(raw).unwrap();
        let message = completion.choices.into_iter().next().unwrap().message;
        let parsed = message.into_completion().unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].arguments["query"], "fast electric");
    }

    #[test]
    fn parse_json_content_strips_code_fences() {
        let fenced = "```json\n{\"rejected\": false}\n```";
        let value = parse_json_content(fenced).unwrap();
        assert_eq!(value["rejected"], false);

        let bare = r#"{"rejected": true}"#;
        assert_eq!(parse_json_content(bare).unwrap()["rejected"], true);
    }
}
