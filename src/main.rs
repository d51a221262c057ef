// sable - retrieval-augmented Pokemon knowledge backend
// Process bootstrap: clients, collections, topics, consumer, HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use qdrant_client::Qdrant;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sable::api;
use sable::chat::{AnswerCache, ChatService, ToolRegistry};
use sable::config::Config;
use sable::db::{self, DocumentLedger, PgDocumentLedger};
use sable::history::{ChatHistory, RedisChatHistory};
use sable::ingest::{IngestService, TOPIC_INGESTION};
use sable::kafka;
use sable::llm::{ChatModel, Embedder, OpenAiChatModel, OpenAiEmbedder};
use sable::pokeapi::{PokeApi, PokeApiClient};
use sable::state::AppState;
use sable::vector::{ensure_collection, QdrantIndex, VectorIndex};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config::from_env();

    // Postgres ledger
    let pool = db::create_pool(&cfg.db.url()).await?;
    db::run_migrations(&pool).await?;
    let ledger: Arc<dyn DocumentLedger> = Arc::new(PgDocumentLedger::new(pool));

    // Qdrant collections
    let mut qdrant_builder = Qdrant::from_url(&cfg.qdrant.url()).skip_compatibility_check();
    if !cfg.qdrant.api_key.is_empty() {
        qdrant_builder = qdrant_builder.api_key(cfg.qdrant.api_key.clone());
    }
    let qdrant = Arc::new(qdrant_builder.build().context("connect to Qdrant")?);
    ensure_collection(&qdrant, &cfg.qdrant.collection, cfg.qdrant.collection_dim).await?;
    ensure_collection(
        &qdrant,
        &cfg.qdrant.cache_collection,
        cfg.qdrant.cache_collection_dim,
    )
    .await?;
    let corpus: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(
        qdrant.clone(),
        &cfg.qdrant.collection,
        cfg.qdrant.collection_dim,
    ));
    let cache_index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(
        qdrant.clone(),
        &cfg.qdrant.cache_collection,
        cfg.qdrant.cache_collection_dim,
    ));

    // Kafka topics
    kafka::ensure_topics(&cfg.kafka, &[TOPIC_INGESTION]).await?;

    // Redis chat history
    let redis_client = redis::Client::open(cfg.redis.url()).context("create redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("connect to redis")?;
    let history: Arc<dyn ChatHistory> = Arc::new(RedisChatHistory::new(
        redis_conn,
        cfg.chat_history.max_messages,
        cfg.chat_history.ttl,
    ));

    // Model and embedding clients
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        &cfg.llm.embed_url,
        &cfg.llm.embed_api_key,
        &cfg.llm.embed_model,
    ));
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
        &cfg.llm.agent_url,
        &cfg.llm.agent_api_key,
        &cfg.llm.agent_model,
    ));
    let fast: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
        &cfg.llm.agent_url,
        &cfg.llm.agent_api_key,
        &cfg.llm.fast_model,
    ));

    // Upstream domain API
    let pokeapi: Arc<dyn PokeApi> = Arc::new(PokeApiClient::new(&cfg.pokeapi.base_url));

    // Pipelines
    let ingest = Arc::new(IngestService::new(
        pokeapi.clone(),
        embedder.clone(),
        corpus.clone(),
        ledger,
    ));
    let chat = Arc::new(ChatService::new(
        model,
        fast.clone(),
        embedder.clone(),
        AnswerCache::new(cache_index, fast),
        history,
        ToolRegistry::new(pokeapi, embedder, corpus),
    ));

    // Consumer loop shares the ingest pipeline with the HTTP endpoint.
    let shutdown = CancellationToken::new();
    let consumer = kafka::create_consumer(&cfg.kafka, &[TOPIC_INGESTION])?;
    let consumer_task = tokio::spawn(kafka::run_ingest_consumer(
        consumer,
        ingest.clone(),
        shutdown.clone(),
    ));

    let state = Arc::new(AppState { ingest, chat });
    let app = api::http::router(state);

    let addr = format!("0.0.0.0:{}", cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), consumer_task).await;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping server...");
}
