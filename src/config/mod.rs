//! Environment-driven configuration.
//!
//! Everything is read once in `Config::from_env()` and handed to the
//! constructors that need it; no global config state.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub qdrant: QdrantConfig,
    pub llm: LlmConfig,
    pub chat_history: ChatHistoryConfig,
    pub pokeapi: PokeApiConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub schema: String,
}

impl DbConfig {
    /// Postgres connection URL for sqlx.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?options=-c%20search_path%3D{}",
            self.username, self.password, self.host, self.port, self.database, self.schema
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub consumer_group: String,
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub collection: String,
    pub collection_dim: usize,
    pub cache_collection: String,
    pub cache_collection_dim: usize,
}

impl QdrantConfig {
    /// gRPC endpoint URL. TLS is implied by the presence of an API key,
    /// matching how managed Qdrant deployments are exposed.
    pub fn url(&self) -> String {
        let scheme = if self.api_key.is_empty() { "http" } else { "https" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub embed_url: String,
    pub embed_api_key: String,
    pub embed_model: String,
    pub agent_url: String,
    pub agent_api_key: String,
    pub agent_model: String,
    pub fast_model: String,
}

#[derive(Debug, Clone)]
pub struct ChatHistoryConfig {
    pub max_messages: usize,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PokeApiConfig {
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        // Local .env is optional; production reads the environment directly.
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                port: env_parse("PORT", 8080),
            },
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_parse("DB_PORT", 5432),
                database: env_or("DB_DATABASE", "sable"),
                username: env_or("DB_USERNAME", "postgres"),
                password: env_or("DB_PASSWORD", ""),
                schema: env_or("DB_SCHEMA", "public"),
            },
            redis: RedisConfig {
                host: env_or("REDIS_HOST", "localhost"),
                port: env_parse("REDIS_PORT", 6379),
                password: env_or("REDIS_PASSWORD", ""),
                db: env_parse("REDIS_DB", 0),
            },
            kafka: KafkaConfig {
                brokers: env_or("KAFKA_BROKERS", "localhost:19092")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                consumer_group: env_or("KAFKA_CONSUMER_GROUP", "sable"),
            },
            qdrant: QdrantConfig {
                host: env_or("QDRANT_HOST", "localhost"),
                port: env_parse("QDRANT_PORT", 6334),
                api_key: env_or("QDRANT_API_KEY", ""),
                collection: env_or("QDRANT_COLLECTION", "pokedex"),
                collection_dim: env_parse("QDRANT_COLLECTION_DIM", 4096),
                cache_collection: env_or("QDRANT_CACHE_COLLECTION", "cache"),
                cache_collection_dim: env_parse("QDRANT_CACHE_COLLECTION_DIM", 1024),
            },
            llm: LlmConfig {
                embed_url: env_or("EMBED_URL", "https://openrouter.ai/api/v1/embeddings"),
                embed_api_key: env_or("EMBED_API_KEY", ""),
                embed_model: env_or("EMBED_MODEL", "qwen/qwen3-embedding-8b"),
                agent_url: env_or("AGENT_URL", "https://openrouter.ai/api/v1"),
                agent_api_key: env_or("AGENT_API_KEY", ""),
                agent_model: env_or("AGENT_MODEL", "openai/gpt-oss-120b"),
                fast_model: env_or("FAST_MODEL", "openai/gpt-oss-120b"),
            },
            chat_history: ChatHistoryConfig {
                max_messages: env_parse("CHAT_HISTORY_MAX_MESSAGES", 5usize),
                ttl: Duration::from_secs(60 * env_parse("CHAT_HISTORY_TTL_MINUTES", 5u64)),
            },
            pokeapi: PokeApiConfig {
                base_url: env_or("POKEAPI_BASE_URL", "https://pokeapi.co/api/v2"),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_omits_empty_password() {
        let cfg = RedisConfig {
            host: "localhost".into(),
            port: 6379,
            password: String::new(),
            db: 0,
        };
        assert_eq!(cfg.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn redis_url_includes_password() {
        let cfg = RedisConfig {
            host: "cache".into(),
            port: 6380,
            password: "hunter2".into(),
            db: 2,
        };
        assert_eq!(cfg.url(), "redis://:hunter2@cache:6380/2");
    }

    #[test]
    fn qdrant_url_uses_tls_with_api_key() {
        let mut cfg = QdrantConfig {
            host: "localhost".into(),
            port: 6334,
            api_key: String::new(),
            collection: "pokedex".into(),
            collection_dim: 4096,
            cache_collection: "cache".into(),
            cache_collection_dim: 1024,
        };
        assert_eq!(cfg.url(), "http://localhost:6334");
        cfg.api_key = "key".into();
        assert_eq!(cfg.url(), "https://localhost:6334");
    }
}
