//! Kafka plumbing: topic bootstrap, a producer for ingestion events, and
//! the consumer loop feeding the ingest pipeline.
//!
//! Delivery is at-least-once and the ingest handler is idempotent, so the
//! loop never needs to dedupe; per-record failures are logged and the
//! record is left for replay.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::KafkaConfig;
use crate::ingest::{IngestService, IngestionEvent};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Create missing topics with one partition and replication factor 1.
pub async fn ensure_topics(cfg: &KafkaConfig, topics: &[&str]) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", cfg.brokers.join(","))
        .create()
        .context("create kafka admin client")?;

    let new_topics: Vec<NewTopic> = topics
        .iter()
        .map(|t| NewTopic::new(t, 1, TopicReplication::Fixed(1)))
        .collect();

    let results = admin
        .create_topics(&new_topics, &AdminOptions::new())
        .await
        .context("create topics")?;

    for result in results {
        match result {
            Ok(topic) => info!("Created Kafka topic: {}", topic),
            Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
            Err((topic, code)) => return Err(anyhow!("create topic {}: {}", topic, code)),
        }
    }
    Ok(())
}

/// Thin producer wrapper keyed for the ingestion topic.
pub struct Producer {
    inner: FutureProducer,
}

impl Producer {
    pub fn new(cfg: &KafkaConfig) -> Result<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", cfg.brokers.join(","))
            .create()
            .context("create kafka producer")?;
        Ok(Self { inner })
    }

    pub async fn produce(&self, topic: &str, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .send(
                FutureRecord::to(topic).key(key).payload(value),
                PRODUCE_TIMEOUT,
            )
            .await
            .map_err(|(e, _)| e)
            .context("produce record")?;
        Ok(())
    }
}

/// Build the group consumer subscribed to the given topics.
pub fn create_consumer(cfg: &KafkaConfig, topics: &[&str]) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", cfg.brokers.join(","))
        .set("group.id", &cfg.consumer_group)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .context("create kafka consumer")?;

    consumer.subscribe(topics).context("subscribe to topics")?;
    Ok(consumer)
}

/// Consume ingestion events until shutdown. In-flight records are not
/// acknowledged past the auto-commit interval, so a restart replays them.
pub async fn run_ingest_consumer(
    consumer: StreamConsumer,
    service: Arc<IngestService>,
    shutdown: CancellationToken,
) {
    info!("Kafka consumer started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Kafka consumer stopping");
                break;
            }
            result = consumer.recv() => match result {
                Ok(message) => handle_record(&service, &message).await,
                Err(e) => warn!("Kafka receive error: {}", e),
            }
        }
    }
}

async fn handle_record(service: &IngestService, message: &BorrowedMessage<'_>) {
    let Some(payload) = message.payload() else {
        warn!("Dropping record with empty payload at offset {}", message.offset());
        return;
    };

    let event: IngestionEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                "Dropping undecodable record at offset {}: {}",
                message.offset(),
                e
            );
            return;
        }
    };

    if let Err(e) = service.ingest(event).await {
        warn!(
            "Ingestion failed for record at offset {}: {:#}",
            message.offset(),
            e
        );
    }
}
