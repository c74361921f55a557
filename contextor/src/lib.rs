//! Question answering over `rag-store` documents.
//!
//! Public API: [`Contextor`]. A question is embedded, the nearest chunks are
//! fetched from the store (stage 1), rescored by a relevance oracle with a
//! response cache in front (stage 2), optionally balanced across the
//! requested documents, and handed to the generation oracle for a cited
//! answer. Document management calls pass through to [`rag_store::RagStore`].

pub mod api_types;
pub mod cache;
pub mod cfg;
mod error;
pub mod llm;
pub mod prompt;
pub mod rank;
pub mod select;
pub mod synth;

pub use api_types::{
    Answer, AskRequest, CacheSettings, Citation, SearchResult, Settings, SettingsUpdate,
};
pub use cfg::ContextorConfig;
pub use error::{ContextorError, Result};
pub use llm::{GenerationOracle, LlmOracle, RelevanceOracle};

use std::sync::Arc;

use ai_llm_service::service_profiles::LlmServiceProfiles;
use rag_store::{
    ChunkingConfig, DocumentChunk, DocumentInfo, FileType, LlmEmbedder, ProcessingState,
    RagConfig, RagStore, SearchFilter, TitleMatch,
};
use tracing::{debug, info, instrument};

use cache::ResponseCache;
use rank::Ranker;
use synth::AnswerSynthesizer;

/// Retrieval, ranking and synthesis wired over one [`RagStore`].
pub struct Contextor {
    store: Arc<RagStore>,
    cfg: ContextorConfig,
    cache: Arc<ResponseCache>,
    ranker: Ranker,
    synth: AnswerSynthesizer,
}

impl Contextor {
    pub fn new(
        store: Arc<RagStore>,
        cfg: ContextorConfig,
        relevance: Arc<dyn RelevanceOracle>,
        generation: Arc<dyn GenerationOracle>,
    ) -> Result<Self> {
        cfg.validate()?;
        let cache = Arc::new(ResponseCache::new(cfg.cache_capacity, cfg.cache_enabled));
        Ok(Self {
            ranker: Ranker::new(&cfg, relevance, cache.clone()),
            synth: AnswerSynthesizer::new(generation, cache.clone(), cfg.generation_timeout),
            store,
            cfg,
            cache,
        })
    }

    /// Builds the store and both oracles over `svc`, reading the rest from env.
    ///
    /// # Errors
    /// Invalid configuration or an index backend that cannot be opened.
    pub async fn from_env(svc: Arc<LlmServiceProfiles>) -> Result<Self> {
        let cfg = ContextorConfig::from_env()?;
        let rag_cfg = RagConfig::from_env()?;
        let store = RagStore::open(rag_cfg, Arc::new(LlmEmbedder::new(svc.clone()))).await?;
        let oracle = Arc::new(LlmOracle::new(svc));
        info!(?cfg, "contextor ready");
        Self::new(store, cfg, oracle.clone(), oracle)
    }

    pub fn store(&self) -> &Arc<RagStore> {
        &self.store
    }

    /* ----------------------------- documents ----------------------------- */

    /// Accepts an upload; ingestion continues in the background.
    pub fn ingest(
        &self,
        bytes: Vec<u8>,
        declared_name: &str,
        file_type: Option<FileType>,
    ) -> Result<ProcessingState> {
        Ok(self.store.ingest(bytes, declared_name, file_type)?)
    }

    pub fn ingest_status(&self, source_id: &str) -> Result<ProcessingState> {
        Ok(self.store.ingest_status(source_id)?)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        Ok(self.store.list_documents().await?)
    }

    pub async fn get_chunks(&self, source_id: &str) -> Result<Vec<DocumentChunk>> {
        Ok(self.store.get_chunks(source_id).await?)
    }

    pub async fn search_titles(&self, query: &str) -> Result<Vec<TitleMatch>> {
        Ok(self.store.search_titles(query).await?)
    }

    pub async fn delete_document(&self, source_id: &str) -> Result<usize> {
        Ok(self.store.delete_document(source_id).await?)
    }

    /// Drops all documents and every cached score and answer.
    pub async fn reset_all(&self) -> Result<()> {
        self.store.reset_all().await?;
        self.cache.clear();
        Ok(())
    }

    /* ------------------------------ answers ------------------------------ */

    /// Answers `req.query` from the indexed documents.
    ///
    /// Zero matching chunks is not an error: the answer says the sources are
    /// insufficient.
    ///
    /// # Errors
    /// `Validation` for an empty query or a `top_k` outside
    /// `1..=max_top_k`; embedding failures; generation failures
    /// (`OracleUnavailable`, `GenerationRejected`).
    #[instrument(skip_all, fields(sources = req.source_ids.as_ref().map(Vec::len)))]
    pub async fn ask(&self, req: &AskRequest) -> Result<Answer> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(ContextorError::Validation("query must not be empty".into()));
        }
        let top_k = self.top_k(req.top_k)?;
        let sources: Vec<String> = req.source_ids.clone().unwrap_or_default();

        let k = select::effective_k(top_k, sources.len());
        let filter = SearchFilter {
            source_ids: (!sources.is_empty()).then(|| sources.clone()),
            title_contains: req
                .title_filter
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            exclude_source_ids: Vec::new(),
        };

        let candidates = self
            .store
            .search_text(query, k.saturating_mul(self.cfg.candidate_multiplier), &filter)
            .await?;
        debug!(k, candidates = candidates.len(), "stage 1 done");

        let mut results = self.ranker.rerank(query, candidates, k).await;
        if self.cfg.balance_sources {
            results = select::balance_sources(results, &sources);
        }

        let out = self.synth.synthesize(query, &results).await?;
        info!(
            results = results.len(),
            citations = out.citations.len(),
            cached = out.cached,
            "question answered"
        );
        Ok(Answer {
            answer_text: out.answer_text,
            citations: out.citations,
            cached: out.cached,
            results,
        })
    }

    fn top_k(&self, requested: Option<usize>) -> Result<usize> {
        match requested {
            None => Ok(self.cfg.top_k),
            Some(k) if (1..=self.cfg.max_top_k).contains(&k) => Ok(k),
            Some(k) => Err(ContextorError::Validation(format!(
                "top_k must be between 1 and {}, got {k}",
                self.cfg.max_top_k
            ))),
        }
    }

    /* ------------------------------ settings ----------------------------- */

    pub fn settings(&self) -> Settings {
        Settings {
            chunking: self.store.chunking(),
            cache: CacheSettings {
                enabled: self.cache.is_enabled(),
                size: self.cfg.cache_capacity,
            },
        }
    }

    /// Applies a validated partial update. Any accepted change clears the
    /// response cache.
    ///
    /// # Errors
    /// `Validation` when the resulting chunking values are out of bounds;
    /// nothing is applied in that case.
    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let current = self.store.chunking();
        let chunking = ChunkingConfig {
            chunk_size: update.chunk_size.unwrap_or(current.chunk_size),
            chunk_overlap: update.chunk_overlap.unwrap_or(current.chunk_overlap),
            unit: update.unit.unwrap_or(current.unit),
        };
        chunking
            .validate()
            .map_err(|e| ContextorError::Validation(e.to_string()))?;

        self.store.set_chunking(chunking)?;
        match update.cache_enabled {
            Some(on) => self.cache.set_enabled(on),
            None => self.cache.clear(),
        }
        info!(?chunking, cache_enabled = self.cache.is_enabled(), "settings updated");
        Ok(self.settings())
    }
}
