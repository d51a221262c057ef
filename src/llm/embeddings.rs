//! OpenAI-compatible embeddings client.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const EMBED_RETRY_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text. `dimensions` requests a specific output width from
    /// models that support truncated embeddings.
    async fn embed(&self, texts: &[String], dimensions: Option<usize>) -> Result<Vec<Vec<f32>>>;
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    /// Full endpoint URL, e.g. `https://openrouter.ai/api/v1/embeddings`.
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn request(&self, texts: &[String], dimensions: Option<usize>) -> Result<Vec<Vec<f32>>> {
        let mut body = json!({
            "model": self.model,
            "input": texts,
        });
        if let Some(dims) = dimensions {
            body["dimensions"] = json!(dims);
        }

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("embedding request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("embedding error {}: {}", status, error_text));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("decode embedding response")?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String], dimensions: Option<usize>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error = None;
        for attempt in 0..=EMBED_RETRY_ATTEMPTS {
            if attempt > 0 {
                debug!("Retrying embed (attempt {})", attempt + 1);
                tokio::time::sleep(RETRY_DELAY).await;
            }
            match self.request(texts, dimensions).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("embedding failed")))
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
