//! Client for the upstream PokeAPI-compatible domain API.
//!
//! Records come back as raw JSON objects; the ingest projection and the
//! chat tools both consume them without a typed schema, so upstream schema
//! drift cannot break decoding.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::UpstreamError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One canonical upstream record.
#[derive(Debug, Clone)]
pub struct Record {
    /// The external id the record was fetched under.
    pub id: String,
    /// Upstream name, e.g. "pikachu" or "thunderbolt".
    pub identifier: String,
    /// The exact response body, re-serialized.
    pub raw_json: String,
    /// Parsed response fields, the projection input.
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait PokeApi: Send + Sync {
    async fn get_pokemon(&self, id: &str) -> Result<Record, UpstreamError>;
    async fn get_move(&self, id: &str) -> Result<Record, UpstreamError>;
}

pub struct PokeApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl PokeApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self, resource: &str, id: &str) -> Result<Record, UpstreamError> {
        let url = format!("{}/{}/{}", self.base_url, resource, id);
        debug!("Fetching upstream record: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Fetch(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Fetch(anyhow!(
                "upstream returned {} for {}",
                status,
                url
            )));
        }

        let metadata: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.into()))?;

        let identifier = metadata
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UpstreamError::Decode(anyhow!("record has no name field")))?
            .to_string();

        let raw_json = serde_json::to_string(&metadata)
            .map_err(|e| UpstreamError::Decode(e.into()))?;

        Ok(Record {
            id: id.to_string(),
            identifier,
            raw_json,
            metadata,
        })
    }
}

#[async_trait]
impl PokeApi for PokeApiClient {
    async fn get_pokemon(&self, id: &str) -> Result<Record, UpstreamError> {
        self.fetch("pokemon", id).await
    }

    async fn get_move(&self, id: &str) -> Result<Record, UpstreamError> {
        self.fetch("move", id).await
    }
}
