//! Document store for retrieval: ingestion lifecycle + vector search.
//!
//! This crate provides a clean API to:
//! - Ingest uploaded documents in the background (extract → chunk → embed → index → verify)
//! - Track each document's [`ProcessingState`]
//! - Search chunks by text, list documents, fetch chunks, search titles
//!
//! Chunks of a document that is still processing are never visible to readers.

pub mod chunker;
pub mod config;
pub mod embed;
pub mod embed_pool;
pub mod errors;
pub mod extract;
mod filters;
pub mod index;
mod ingest;
pub mod memory_index;
pub mod normalize;
pub mod qdrant_facade;
pub mod record;
pub mod state;

pub use config::{ChunkingConfig, IndexBackend, RagConfig, SizeUnit};
pub use embed::EmbeddingsProvider;
pub use embed::hashing::HashingEmbedder;
pub use embed::llm::LlmEmbedder;
pub use embed_pool::Embedder;
pub use errors::RagError;
pub use extract::{FileType, PlainTextExtractor, TextExtractor};
pub use index::VectorIndex;
pub use record::{
    DocumentChunk, DocumentInfo, SearchFilter, SourceSummary, TitleMatch, VectorHit,
};
pub use state::{ProcessingState, ProcessingStatus};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::RwLock as AsyncRwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::ingest::{IngestJob, Pipeline, SourceLocks};
use crate::memory_index::MemoryIndex;
use crate::qdrant_facade::QdrantIndex;
use crate::state::{IngestEvent, StateStore};

/// High-level facade over the index, the embedder and the processing states.
///
/// This is the single entry point recommended for application code.
pub struct RagStore {
    cfg: RagConfig,
    chunking: RwLock<ChunkingConfig>,
    index: Arc<dyn VectorIndex>,
    embedder: Embedder,
    extractor: Arc<dyn TextExtractor>,
    states: StateStore,
    locks: SourceLocks,
    /// Held shared from acceptance to the end of an ingestion; `reset_all`
    /// takes it exclusively.
    gate: Arc<AsyncRwLock<()>>,
}

impl RagStore {
    /// Builds the configured index backend and seeds processing states from
    /// what it already holds.
    ///
    /// # Errors
    /// `RagError::Config` on invalid configuration or when `EMBEDDING_DIM`
    /// disagrees with the stored vectors; backend errors while opening.
    pub async fn open(
        cfg: RagConfig,
        provider: Arc<dyn EmbeddingsProvider>,
    ) -> Result<Arc<Self>, RagError> {
        cfg.validate()?;
        let index: Arc<dyn VectorIndex> = match &cfg.backend {
            IndexBackend::Memory { snapshot: None } => Arc::new(MemoryIndex::new()),
            IndexBackend::Memory {
                snapshot: Some(path),
            } => Arc::new(MemoryIndex::open(path).await?),
            IndexBackend::Qdrant {
                url,
                api_key,
                collection,
                exact,
            } => Arc::new(QdrantIndex::new(
                url,
                api_key.clone(),
                collection.clone(),
                *exact,
            )?),
        };
        Self::with_index(cfg, provider, index).await
    }

    /// Same as [`RagStore::open`] over a caller-supplied index.
    pub async fn with_index(
        cfg: RagConfig,
        provider: Arc<dyn EmbeddingsProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Arc<Self>, RagError> {
        cfg.validate()?;
        let stored_dim = index.dimension().await?;
        let dim = match (cfg.embedding_dim, stored_dim) {
            (Some(want), Some(have)) if want != have => {
                return Err(RagError::Config(format!(
                    "EMBEDDING_DIM={want} but the index holds {have}-dimensional vectors"
                )));
            }
            (want, have) => want.or(have),
        };

        let embedder = Embedder::new(
            provider,
            cfg.embedding_batch,
            cfg.embedding_concurrency,
            dim,
        );
        let states = StateStore::new();
        let sources = index.list_sources().await?;
        states.seed_completed(&sources);
        info!(
            documents = sources.len(),
            dim = ?dim,
            "rag store ready"
        );

        Ok(Arc::new(Self {
            chunking: RwLock::new(cfg.chunking),
            cfg,
            index,
            embedder,
            extractor: Arc::new(PlainTextExtractor),
            states,
            locks: SourceLocks::default(),
            gate: Arc::new(AsyncRwLock::new(())),
        }))
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Current chunking settings (used by the next ingestion).
    pub fn chunking(&self) -> ChunkingConfig {
        *self.chunking.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the chunking settings; documents already indexed are untouched.
    ///
    /// # Errors
    /// `RagError::Validation` when the values are out of bounds.
    pub fn set_chunking(&self, cfg: ChunkingConfig) -> Result<(), RagError> {
        cfg.validate()?;
        *self.chunking.write().unwrap_or_else(PoisonError::into_inner) = cfg;
        info!(?cfg, "chunking settings updated");
        Ok(())
    }

    /// Accepts an upload and starts its ingestion in the background.
    ///
    /// `file_type` overrides the type derived from `declared_name`.
    ///
    /// # Errors
    /// `Validation` for an empty name, empty or oversized content;
    /// `UnsupportedFileType`; `AlreadyProcessing` while the same source is
    /// still being ingested; `ResetInProgress` while `reset_all` runs.
    /// Nothing is started in those cases.
    pub fn ingest(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        declared_name: &str,
        file_type: Option<FileType>,
    ) -> Result<ProcessingState, RagError> {
        self.start(bytes, declared_name, file_type)
            .map(|(state, _)| state)
    }

    /// [`RagStore::ingest`] that waits for the terminal state.
    pub async fn ingest_and_wait(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        declared_name: &str,
        file_type: Option<FileType>,
    ) -> Result<ProcessingState, RagError> {
        let (state, handle) = self.start(bytes, declared_name, file_type)?;
        if let Err(e) = handle.await {
            warn!(error = %e, "ingestion task ended abnormally");
        }
        self.states
            .get(&state.source_id)
            .ok_or_else(|| RagError::NotFound(state.source_id.clone()))
    }

    fn start(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        declared_name: &str,
        file_type: Option<FileType>,
    ) -> Result<(ProcessingState, JoinHandle<()>), RagError> {
        let source_id = declared_name.trim();
        if source_id.is_empty() {
            return Err(RagError::Validation("file name must not be empty".into()));
        }
        if bytes.is_empty() {
            return Err(RagError::Validation(format!("{source_id} is empty")));
        }
        if bytes.len() > self.cfg.max_upload_bytes {
            return Err(RagError::Validation(format!(
                "{source_id} is {} bytes, limit is {}",
                bytes.len(),
                self.cfg.max_upload_bytes
            )));
        }
        let file_type = match file_type {
            Some(ft) => ft,
            None => FileType::from_name(source_id)?,
        };

        let gate = Arc::clone(&self.gate)
            .try_read_owned()
            .map_err(|_| RagError::ResetInProgress(source_id.to_string()))?;
        let state = self.states.apply(source_id, IngestEvent::Started)?;
        info!(source_id, file_type = file_type.as_str(), bytes = bytes.len(), "ingestion accepted");

        let job = IngestJob {
            source_id: source_id.to_string(),
            bytes,
            file_type,
            chunking: self.chunking(),
        };
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _gate = gate;
            let _lock = this.locks.lock(&job.source_id).await;
            this.pipeline().run(&job).await;
        });
        Ok((state, handle))
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            extractor: self.extractor.as_ref(),
            embedder: &self.embedder,
            index: self.index.as_ref(),
            states: &self.states,
        }
    }

    /// # Errors
    /// `RagError::NotFound` for a source that was never ingested.
    pub fn ingest_status(&self, source_id: &str) -> Result<ProcessingState, RagError> {
        self.states
            .get(source_id)
            .ok_or_else(|| RagError::NotFound(source_id.to_string()))
    }

    /// Every known document, sorted by source id.
    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>, RagError> {
        let indexed: HashMap<String, SourceSummary> = self
            .index
            .list_sources()
            .await?
            .into_iter()
            .map(|s| (s.source_id.clone(), s))
            .collect();

        let mut out: Vec<DocumentInfo> = self
            .states
            .all()
            .into_iter()
            .map(|st| {
                let summary = indexed.get(&st.source_id);
                let (chunk_count, total_chunks) = match (st.status, summary) {
                    (ProcessingStatus::Completed, Some(s)) => (s.chunk_count, s.total_chunks),
                    _ => (st.chunk_count, st.total_chunks),
                };
                DocumentInfo {
                    title: st
                        .title
                        .clone()
                        .or_else(|| summary.map(|s| s.title.clone()))
                        .unwrap_or_else(|| st.source_id.clone()),
                    source_id: st.source_id,
                    chunk_count,
                    total_chunks,
                    status: st.status,
                }
            })
            .collect();

        // Indexed but untracked (written by another process).
        for (id, s) in indexed {
            if self.states.get(&id).is_none() {
                out.push(DocumentInfo {
                    source_id: id,
                    title: s.title,
                    chunk_count: s.chunk_count,
                    total_chunks: s.total_chunks,
                    status: ProcessingStatus::Completed,
                });
            }
        }
        out.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(out)
    }

    /// Chunks of a document ordered by `chunk_index`; empty while processing
    /// or when unknown.
    pub async fn get_chunks(&self, source_id: &str) -> Result<Vec<DocumentChunk>, RagError> {
        if self.states.is_processing(source_id) {
            trace!(source_id, "get_chunks on processing document");
            return Ok(Vec::new());
        }
        self.index.get_chunks(source_id).await
    }

    /// Case-insensitive substring match over titles of completed documents.
    pub async fn search_titles(&self, query: &str) -> Result<Vec<TitleMatch>, RagError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let matches: BTreeSet<(String, String)> = self
            .list_documents()
            .await?
            .into_iter()
            .filter(|d| d.status == ProcessingStatus::Completed)
            .filter(|d| d.title.to_lowercase().contains(&needle))
            .map(|d| (d.title, d.source_id))
            .collect();
        debug!(query = %needle, matches = matches.len(), "title search");
        Ok(matches
            .into_iter()
            .map(|(title, source_id)| TitleMatch { title, source_id })
            .collect())
    }

    /// Embeds `query` and returns up to `k` nearest chunks of visible documents.
    ///
    /// # Errors
    /// `Validation` for an empty query; embedding or backend failures.
    pub async fn search_text(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        let mut visible = filter.clone();
        visible
            .exclude_source_ids
            .extend(self.states.processing_sources());
        let hits = self.index.search(&vector, k, &visible).await?;
        debug!(k, hits = hits.len(), "vector search");
        Ok(hits)
    }

    /// Removes a document and its state.
    ///
    /// # Errors
    /// `NotFound` for an unknown source, `AlreadyProcessing` while it is
    /// being ingested.
    pub async fn delete_document(&self, source_id: &str) -> Result<usize, RagError> {
        if self.states.is_processing(source_id) {
            return Err(RagError::AlreadyProcessing(source_id.to_string()));
        }
        let _lock = self.locks.lock(source_id).await;
        let removed = self.index.remove(source_id).await?;
        let known = self.states.remove(source_id).is_some();
        if removed == 0 && !known {
            return Err(RagError::NotFound(source_id.to_string()));
        }
        info!(source_id, removed, "document deleted");
        Ok(removed)
    }

    /// Drops every document and state. Waits for running ingestions to finish.
    pub async fn reset_all(&self) -> Result<(), RagError> {
        let _gate = self.gate.write().await;
        self.index.reset().await?;
        self.states.clear();
        info!("all documents removed");
        Ok(())
    }
}
