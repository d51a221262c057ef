//! Ingestion pipeline: upstream fetch, projection, embedding, and the
//! ledger-scoped replacement of a document's vectors.

pub mod projection;
pub mod types;

pub use types::{Document, DocumentType, IngestionEvent, TOPIC_INGESTION};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::DocumentLedger;
use crate::error::{IngestError, UpstreamError};
use crate::llm::Embedder;
use crate::pokeapi::PokeApi;
use crate::vector::{Filter, Point, VectorIndex};

use types::{PAYLOAD_REFERENCE, PAYLOAD_TYPE};

pub struct IngestService {
    api: Arc<dyn PokeApi>,
    embedder: Arc<dyn Embedder>,
    corpus: Arc<dyn VectorIndex>,
    ledger: Arc<dyn DocumentLedger>,
}

impl IngestService {
    pub fn new(
        api: Arc<dyn PokeApi>,
        embedder: Arc<dyn Embedder>,
        corpus: Arc<dyn VectorIndex>,
        ledger: Arc<dyn DocumentLedger>,
    ) -> Self {
        Self {
            api,
            embedder,
            corpus,
            ledger,
        }
    }

    /// Handle one ingestion event end-to-end. Replaying the same event is
    /// safe: the ledger upsert converges on `(document_type, external_id)`
    /// and the delete-then-upsert replaces every prior point under the
    /// document's reference.
    pub async fn ingest(&self, event: IngestionEvent) -> Result<(), IngestError> {
        let doc_type = DocumentType::parse(&event.doc_type)
            .ok_or_else(|| IngestError::UnsupportedType(event.doc_type.clone()))?;

        let record = match doc_type {
            DocumentType::Pokemon => self.api.get_pokemon(&event.id).await,
            DocumentType::Move => self.api.get_move(&event.id).await,
        }
        .map_err(|e| match e {
            UpstreamError::Fetch(cause) => IngestError::UpstreamFetch {
                doc_type: doc_type.to_string(),
                id: event.id.clone(),
                cause,
            },
            UpstreamError::Decode(cause) => IngestError::UpstreamDecode {
                doc_type: doc_type.to_string(),
                id: event.id.clone(),
                cause,
            },
        })?;

        let reference = doc_type.reference(&event.id);

        let text = projection::render(doc_type, &record);
        if text.trim().is_empty() {
            return Err(IngestError::EmptyProjection(reference));
        }

        let vectors = self
            .embedder
            .embed(
                std::slice::from_ref(&text),
                Some(self.corpus.dimensions()),
            )
            .await
            .map_err(IngestError::Embedding)?;
        if vectors.is_empty() {
            return Err(IngestError::NoEmbeddings);
        }

        let now = Utc::now();
        let doc = Document {
            id: Uuid::now_v7(),
            document_type: doc_type,
            external_id: event.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let payload: HashMap<String, Value> = [
            (PAYLOAD_REFERENCE.to_string(), Value::from(reference.clone())),
            (PAYLOAD_TYPE.to_string(), Value::from(doc_type.as_str())),
            ("content".to_string(), Value::from(text)),
        ]
        .into();

        let points: Vec<Point> = vectors
            .into_iter()
            .map(|vector| Point {
                id: Uuid::now_v7(),
                vector,
                payload: payload.clone(),
            })
            .collect();
        let point_count = points.len();

        // The ledger transaction brackets the vector replacement: if the
        // delete or upsert fails, the ledger rolls back and the event can
        // be replayed. The vector index itself is not transactional.
        let corpus = self.corpus.clone();
        let tx_reference = reference.clone();
        self.ledger
            .in_tx(Box::new(move |tx| {
                Box::pin(async move {
                    tx.upsert(&doc).await?;
                    corpus
                        .delete(Filter::must_match(PAYLOAD_REFERENCE, &tx_reference))
                        .await?;
                    corpus.upsert(points).await?;
                    Ok(())
                })
            }))
            .await
            .map_err(IngestError::Store)?;

        info!("Ingested {} ({} points)", reference, point_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;

    use crate::db::TxFn;
    use crate::pokeapi::Record;
    use crate::vector::SearchResult;

    /// Shared call log asserting cross-component ordering.
    type CallLog = Arc<Mutex<Vec<String>>>;

    struct StubApi {
        record: Result<Record, String>,
    }

    fn pikachu() -> Record {
        let metadata = json!({
            "name": "pikachu",
            "types": [{"type": {"name": "electric"}}],
        });
        Record {
            id: "25".into(),
            identifier: "pikachu".into(),
            raw_json: metadata.to_string(),
            metadata: metadata.as_object().cloned().unwrap(),
        }
    }

    #[async_trait]
    impl PokeApi for StubApi {
        async fn get_pokemon(&self, _id: &str) -> Result<Record, UpstreamError> {
            self.record
                .clone()
                .map_err(|e| UpstreamError::Fetch(anyhow!(e)))
        }

        async fn get_move(&self, _id: &str) -> Result<Record, UpstreamError> {
            self.record
                .clone()
                .map_err(|e| UpstreamError::Fetch(anyhow!(e)))
        }
    }

    struct StubEmbedder {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(
            &self,
            _texts: &[String],
            _dimensions: Option<usize>,
        ) -> Result<Vec<Vec<f32>>> {
            Ok(self.vectors.clone())
        }
    }

    #[derive(Default)]
    struct StubIndexState {
        upserted: Vec<Point>,
        deleted: Vec<Filter>,
        fail_upsert: bool,
    }

    struct StubIndex {
        state: Arc<Mutex<StubIndexState>>,
        log: CallLog,
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn upsert(&self, points: Vec<Point>) -> Result<()> {
            self.log.lock().unwrap().push("index.upsert".into());
            let mut state = self.state.lock().unwrap();
            if state.fail_upsert {
                return Err(anyhow!("qdrant unavailable"));
            }
            state.upserted.extend(points);
            Ok(())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _limit: usize,
            _filter: Option<Filter>,
        ) -> Result<Vec<SearchResult>> {
            Ok(Vec::new())
        }

        async fn delete(&self, filter: Filter) -> Result<()> {
            self.log.lock().unwrap().push("index.delete".into());
            self.state.lock().unwrap().deleted.push(filter);
            Ok(())
        }

        async fn delete_by_id(&self, _ids: Vec<Uuid>) -> Result<()> {
            Ok(())
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[derive(Default)]
    struct StubLedgerState {
        upserted: Vec<Document>,
        committed: bool,
        rolled_back: bool,
    }

    struct StubLedger {
        state: Arc<Mutex<StubLedgerState>>,
        log: CallLog,
    }

    #[async_trait]
    impl DocumentLedger for StubLedger {
        async fn upsert(&self, doc: &Document) -> Result<()> {
            self.log.lock().unwrap().push("ledger.upsert".into());
            self.state.lock().unwrap().upserted.push(doc.clone());
            Ok(())
        }

        async fn delete(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn delete_by_ref(&self, _dt: DocumentType, _external_id: &str) -> Result<()> {
            Ok(())
        }

        async fn find_by_ref(
            &self,
            _dt: DocumentType,
            _external_id: &str,
        ) -> Result<Option<Document>> {
            Ok(None)
        }

        async fn in_tx(&self, f: TxFn) -> Result<()> {
            let tx = Arc::new(StubLedger {
                state: self.state.clone(),
                log: self.log.clone(),
            });
            match f(tx).await {
                Ok(()) => {
                    self.state.lock().unwrap().committed = true;
                    Ok(())
                }
                Err(e) => {
                    self.state.lock().unwrap().rolled_back = true;
                    Err(e)
                }
            }
        }
    }

    struct Harness {
        service: IngestService,
        index: Arc<Mutex<StubIndexState>>,
        ledger: Arc<Mutex<StubLedgerState>>,
        log: CallLog,
    }

    fn harness(record: Result<Record, String>, vectors: Vec<Vec<f32>>, fail_upsert: bool) -> Harness {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let index_state = Arc::new(Mutex::new(StubIndexState {
            fail_upsert,
            ..Default::default()
        }));
        let ledger_state = Arc::new(Mutex::new(StubLedgerState::default()));

        let service = IngestService::new(
            Arc::new(StubApi { record }),
            Arc::new(StubEmbedder { vectors }),
            Arc::new(StubIndex {
                state: index_state.clone(),
                log: log.clone(),
            }),
            Arc::new(StubLedger {
                state: ledger_state.clone(),
                log: log.clone(),
            }),
        );

        Harness {
            service,
            index: index_state,
            ledger: ledger_state,
            log,
        }
    }

    fn event(doc_type: &str, id: &str) -> IngestionEvent {
        IngestionEvent {
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    #[tokio::test]
    async fn ingest_replaces_vectors_inside_the_ledger_transaction() {
        let h = harness(Ok(pikachu()), vec![vec![0.1, 0.2], vec![0.3, 0.4]], false);

        h.service.ingest(event("pokemon", "25")).await.unwrap();

        // Ledger upsert happens first, then delete-then-upsert on the index.
        assert_eq!(
            *h.log.lock().unwrap(),
            vec!["ledger.upsert", "index.delete", "index.upsert"]
        );

        let ledger = h.ledger.lock().unwrap();
        assert!(ledger.committed);
        assert_eq!(ledger.upserted.len(), 1);
        assert_eq!(ledger.upserted[0].external_id, "25");
        assert_eq!(ledger.upserted[0].document_type, DocumentType::Pokemon);

        let index = h.index.lock().unwrap();
        assert_eq!(
            index.deleted[0],
            Filter::must_match("reference", "pokemon_25")
        );
        assert_eq!(index.upserted.len(), 2);
        for point in &index.upserted {
            assert_eq!(point.payload["reference"], "pokemon_25");
            assert_eq!(point.payload["type"], "pokemon");
            assert!(point.payload["content"]
                .as_str()
                .unwrap()
                .starts_with("Pokemon: pikachu"));
        }
        // Fresh ids per ingest, never derived from the reference.
        assert_ne!(index.upserted[0].id, index.upserted[1].id);
    }

    #[tokio::test]
    async fn unsupported_type_fails_before_any_fetch() {
        let h = harness(Ok(pikachu()), vec![vec![0.1]], false);

        let err = h.service.ingest(event("berry", "1")).await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType(ref t) if t == "berry"));
        assert!(err.to_string().contains("unsupported"));
        assert!(h.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_fails_the_ingest() {
        let h = harness(Err("connection refused".into()), vec![vec![0.1]], false);

        let err = h.service.ingest(event("pokemon", "25")).await.unwrap_err();
        assert!(matches!(err, IngestError::UpstreamFetch { .. }));
        assert!(!h.ledger.lock().unwrap().committed);
    }

    #[tokio::test]
    async fn empty_embedding_batch_is_rejected() {
        let h = harness(Ok(pikachu()), Vec::new(), false);

        let err = h.service.ingest(event("pokemon", "25")).await.unwrap_err();
        assert!(matches!(err, IngestError::NoEmbeddings));
        assert!(h.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_upsert_failure_rolls_back_the_ledger() {
        let h = harness(Ok(pikachu()), vec![vec![0.1, 0.2]], true);

        let err = h.service.ingest(event("pokemon", "25")).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));

        let ledger = h.ledger.lock().unwrap();
        assert!(!ledger.committed);
        assert!(ledger.rolled_back);
    }

    #[tokio::test]
    async fn move_events_dispatch_to_the_move_projection() {
        let metadata = json!({"name": "thunderbolt", "power": 90});
        let record = Record {
            id: "85".into(),
            identifier: "thunderbolt".into(),
            raw_json: metadata.to_string(),
            metadata: metadata.as_object().cloned().unwrap(),
        };
        let h = harness(Ok(record), vec![vec![0.5]], false);

        h.service.ingest(event("move", "85")).await.unwrap();

        let index = h.index.lock().unwrap();
        assert_eq!(index.upserted[0].payload["reference"], "move_85");
        assert!(index.upserted[0].payload["content"]
            .as_str()
            .unwrap()
            .starts_with("Move: thunderbolt"));
    }
}
