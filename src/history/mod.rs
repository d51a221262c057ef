//! Per-user bounded chat history with TTL, stored as a Redis list.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Messages in insertion order. Malformed stored records are dropped.
    async fn get(&self, user: &str) -> Result<Vec<ChatMessage>>;

    /// Push all messages, trim to the bound, refresh the expiry — as one
    /// pipelined operation so a concurrent reader never sees the list
    /// unbounded.
    async fn append(&self, user: &str, messages: &[ChatMessage]) -> Result<()>;

    async fn clear(&self, user: &str) -> Result<()>;
}

pub struct RedisChatHistory {
    conn: ConnectionManager,
    max_messages: usize,
    ttl: Duration,
}

impl RedisChatHistory {
    pub fn new(conn: ConnectionManager, max_messages: usize, ttl: Duration) -> Self {
        Self {
            conn,
            max_messages,
            ttl,
        }
    }

    fn key(user: &str) -> String {
        format!("chat:history:{}", user)
    }
}

#[async_trait]
impl ChatHistory for RedisChatHistory {
    async fn get(&self, user: &str) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(Self::key(user), 0, -1)
            .await
            .context("read chat history")?;
        Ok(decode_messages(raw))
    }

    async fn append(&self, user: &str, messages: &[ChatMessage]) -> Result<()> {
        let key = Self::key(user);
        let mut pipe = redis::pipe();
        for msg in messages {
            let data = serde_json::to_string(msg).context("encode chat message")?;
            pipe.rpush(&key, data).ignore();
        }
        pipe.ltrim(&key, -(self.max_messages as isize), -1).ignore();
        pipe.expire(&key, self.ttl.as_secs() as i64).ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .context("append chat history")?;
        Ok(())
    }

    async fn clear(&self, user: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(user))
            .await
            .context("clear chat history")?;
        Ok(())
    }
}

/// Parse stored records, silently dropping anything malformed.
fn decode_messages(raw: Vec<String>) -> Vec<ChatMessage> {
    raw.into_iter()
        .filter_map(|data| match serde_json::from_str(&data) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("Dropping malformed history record: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespaced_per_user() {
        assert_eq!(RedisChatHistory::key("ash"), "chat:history:ash");
    }

    #[test]
    fn message_roundtrips_through_json() {
        let msg = ChatMessage::user("what is pikachu?");
        let data = serde_json::to_string(&msg).unwrap();
        assert_eq!(data, r#"{"role":"user","text":"what is pikachu?"}"#);
        let back: ChatMessage = serde_json::from_str(&data).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn malformed_records_are_dropped() {
        let raw = vec![
            r#"{"role":"user","text":"hello"}"#.to_string(),
            "not json".to_string(),
            r#"{"role":"narrator","text":"??"}"#.to_string(),
            r#"{"role":"model","text":"hi"}"#.to_string(),
        ];
        let messages = decode_messages(raw);
        assert_eq!(
            messages,
            vec![ChatMessage::user("hello"), ChatMessage::model("hi")]
        );
    }
}
