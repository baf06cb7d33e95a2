use crate::chunk::ChunkPolicy;
use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::Embedder;
use crate::error::{DocChatError, EmbeddingError, IngestError};
use crate::extract::extract_pages;
use crate::index::VectorIndex;
use crate::store::DocumentStore;
use crate::types::{Document, DocumentId, DocumentStatus, PageText, Passage, UserId};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Background pipeline turning uploaded PDF bytes into a Ready document
///
/// Upload returns as soon as the document is registered Ingesting; the
/// heavy work (extraction, chunking, embedding, index build) runs on a
/// spawned task and flips the document to Ready or Failed when done.
#[derive(Clone)]
pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<DocumentStore>,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<DocumentStore>,
        chunking: ChunkingConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            embedding,
        }
    }

    /// Accept an upload: register the document and start background ingestion
    ///
    /// The returned document is in the Ingesting state; poll its status to
    /// observe the Ready or Failed transition.
    pub fn ingest_document(
        &self,
        owner: UserId,
        pdf_bytes: Vec<u8>,
    ) -> Result<Document, DocChatError> {
        let document = Document {
            id: DocumentId::generate(),
            owner,
            page_count: 0,
            status: DocumentStatus::Ingesting,
            content_hash: content_hash(&pdf_bytes),
            created_at: Utc::now(),
        };
        self.store.register_ingesting(document.clone())?;

        let pipeline = self.clone();
        let id = document.id.clone();
        tokio::spawn(async move {
            if let Err(err) = pipeline.run(&id, pdf_bytes).await {
                if let Err(store_err) = pipeline.store.mark_failed(&id, err.to_string()) {
                    tracing::error!(document = %id, error = %store_err, "failed to record ingestion failure");
                }
            }
        });

        Ok(document)
    }

    async fn run(&self, id: &DocumentId, pdf_bytes: Vec<u8>) -> Result<(), IngestError> {
        let pages = tokio::task::spawn_blocking(move || extract_pages(&pdf_bytes))
            .await
            .map_err(|e| IngestError::Internal(e.to_string()))??;

        tracing::info!(document = %id, pages = pages.len(), "extracted document");
        self.index_pages(id, pages).await
    }

    /// Chunk, embed, and index already-extracted pages
    ///
    /// Split out from `run` so documents can be ingested from plain page
    /// text without going through the PDF extractor.
    pub async fn index_pages(
        &self,
        id: &DocumentId,
        pages: Vec<PageText>,
    ) -> Result<(), IngestError> {
        let policy = ChunkPolicy::new(self.chunking.target_size, self.chunking.overlap)
            .map_err(|e| IngestError::Internal(e.to_string()))?;

        // Deterministic passage order: page order, then offset within the page
        let mut passages: Vec<Passage> = Vec::new();
        for page in &pages {
            for draft in policy.chunk_page(&page.text, page.page_number) {
                passages.push(Passage {
                    document_id: id.clone(),
                    passage_index: passages.len(),
                    page_number: draft.page_number,
                    text: draft.text,
                    char_start: draft.char_start,
                    char_end: draft.char_end,
                    embedding: Vec::new(),
                });
            }
        }

        tracing::debug!(document = %id, passages = passages.len(), "chunked document");
        self.embed_passages(&mut passages).await?;

        let index = VectorIndex::build(self.embedder.model_id(), self.embedder.dimension(), &passages)?;

        self.store
            .set_page_count(id, pages.len())
            .and_then(|_| self.store.mark_ready(id, passages, index))
            .map_err(|e| IngestError::Internal(e.to_string()))?;

        tracing::info!(document = %id, "document ready");
        Ok(())
    }

    /// Embed passages in batches, retrying rate limits with backoff
    async fn embed_passages(&self, passages: &mut [Passage]) -> Result<(), IngestError> {
        let batch_size = self.embedding.batch_size.max(1);

        for batch in passages.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = self.embed_with_retry(texts).await?;
            for (passage, vector) in batch.iter_mut().zip(vectors) {
                passage.embedding = vector;
            }
        }
        Ok(())
    }

    async fn embed_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IngestError> {
        let max_retries = self.embedding.max_retries;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let embedder = Arc::clone(&self.embedder);
            let batch = texts.clone();
            let result = tokio::task::spawn_blocking(move || embedder.embed_batch(batch))
                .await
                .map_err(|e| IngestError::Internal(e.to_string()))?;

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(EmbeddingError::RateLimited(msg)) if attempt <= max_retries => {
                    let delay =
                        Duration::from_millis(self.embedding.retry_base_ms << (attempt - 1).min(8));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "embedding rate limited, backing off: {}",
                        msg
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(IngestError::EmbeddingExhausted {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

/// SHA-256 of the uploaded bytes, hex-encoded
fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
