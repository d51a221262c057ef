//! Relational ledger of ingested documents.
//!
//! `(document_type, external_id)` is unique; upserting an existing pair
//! only bumps `updated_at`. The transactional scope offered by `in_tx`
//! covers the ledger alone — vector index mutations run inside the closure
//! but are not enrolled in the database transaction.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ingest::types::{Document, DocumentType};

/// Closure run against a transaction-bound ledger handle.
pub type TxFn = Box<dyn FnOnce(Arc<dyn DocumentLedger>) -> BoxFuture<'static, Result<()>> + Send>;

#[async_trait]
pub trait DocumentLedger: Send + Sync {
    /// Insert if absent, else bump `updated_at`.
    async fn upsert(&self, doc: &Document) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn delete_by_ref(&self, doc_type: DocumentType, external_id: &str) -> Result<()>;

    async fn find_by_ref(
        &self,
        doc_type: DocumentType,
        external_id: &str,
    ) -> Result<Option<Document>>;

    /// Run `f` against a ledger handle bound to a single transaction.
    /// Commit on success, roll back on error. Nested calls are rejected.
    async fn in_tx(&self, f: TxFn) -> Result<()>;
}

pub struct PgDocumentLedger {
    pool: PgPool,
}

impl PgDocumentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentLedger for PgDocumentLedger {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        upsert_doc(&self.pool, doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        delete_doc(&self.pool, id).await
    }

    async fn delete_by_ref(&self, doc_type: DocumentType, external_id: &str) -> Result<()> {
        delete_by_ref(&self.pool, doc_type, external_id).await
    }

    async fn find_by_ref(
        &self,
        doc_type: DocumentType,
        external_id: &str,
    ) -> Result<Option<Document>> {
        find_by_ref(&self.pool, doc_type, external_id).await
    }

    async fn in_tx(&self, f: TxFn) -> Result<()> {
        let tx = self.pool.begin().await.context("begin transaction")?;
        let handle = Arc::new(PgLedgerTx {
            tx: Mutex::new(Some(tx)),
        });

        let result = f(handle.clone()).await;

        let tx = handle
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("transaction consumed by closure"))?;

        match result {
            Ok(()) => tx.commit().await.context("commit transaction"),
            Err(e) => {
                // Rollback failure is secondary to the closure error.
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

/// Ledger handle bound to one open transaction.
struct PgLedgerTx {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

#[async_trait]
impl DocumentLedger for PgLedgerTx {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        upsert_doc(&mut **tx, doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        delete_doc(&mut **tx, id).await
    }

    async fn delete_by_ref(&self, doc_type: DocumentType, external_id: &str) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        delete_by_ref(&mut **tx, doc_type, external_id).await
    }

    async fn find_by_ref(
        &self,
        doc_type: DocumentType,
        external_id: &str,
    ) -> Result<Option<Document>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| anyhow!("transaction already finished"))?;
        find_by_ref(&mut **tx, doc_type, external_id).await
    }

    async fn in_tx(&self, _f: TxFn) -> Result<()> {
        Err(anyhow!("nested transactions are not supported"))
    }
}

async fn upsert_doc<'e, E>(executor: E, doc: &Document) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO ingested_documents (id, document_type, external_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) \
         ON CONFLICT (document_type, external_id) \
         DO UPDATE SET updated_at = EXCLUDED.updated_at",
    )
    .bind(doc.id)
    .bind(doc.document_type.as_str())
    .bind(&doc.external_id)
    .bind(now)
    .execute(executor)
    .await
    .context("upsert document")?;
    Ok(())
}

async fn delete_doc<'e, E>(executor: E, id: Uuid) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("DELETE FROM ingested_documents WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .context("delete document")?;
    Ok(())
}

async fn delete_by_ref<'e, E>(executor: E, doc_type: DocumentType, external_id: &str) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("DELETE FROM ingested_documents WHERE document_type = $1 AND external_id = $2")
        .bind(doc_type.as_str())
        .bind(external_id)
        .execute(executor)
        .await
        .context("delete document by reference")?;
    Ok(())
}

async fn find_by_ref<'e, E>(
    executor: E,
    doc_type: DocumentType,
    external_id: &str,
) -> Result<Option<Document>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<(Uuid, String, String, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> =
        sqlx::query_as(
            "SELECT id, document_type, external_id, created_at, updated_at \
             FROM ingested_documents WHERE document_type = $1 AND external_id = $2",
        )
        .bind(doc_type.as_str())
        .bind(external_id)
        .fetch_optional(executor)
        .await
        .context("find document by reference")?;

    row.map(|(id, document_type, external_id, created_at, updated_at)| {
        let document_type = DocumentType::parse(&document_type)
            .ok_or_else(|| anyhow!("ledger row has unknown document type: {}", document_type))?;
        Ok(Document {
            id,
            document_type,
            external_id,
            created_at,
            updated_at,
        })
    })
    .transpose()
}
