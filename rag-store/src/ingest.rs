//! Per-document ingestion pipeline: extract → chunk → embed → index → verify.
//!
//! One task owns a document from `Started` to a terminal state. The only
//! `VectorIndex::add` call for document content lives in [`process`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::chunker::Chunker;
use crate::config::ChunkingConfig;
use crate::embed_pool::Embedder;
use crate::errors::RagError;
use crate::extract::{FileType, TextExtractor, resolve_title};
use crate::index::VectorIndex;
use crate::record::{DocumentChunk, EmbeddedChunk};
use crate::state::{IngestEvent, StateStore};

/// Async mutex per source id.
#[derive(Default)]
pub(crate) struct SourceLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SourceLocks {
    pub(crate) async fn lock(&self, source_id: &str) -> OwnedMutexGuard<()> {
        let m = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(source_id.to_string()).or_default().clone()
        };
        m.lock_owned().await
    }
}

/// One accepted upload.
pub(crate) struct IngestJob {
    pub source_id: String,
    pub bytes: Vec<u8>,
    pub file_type: FileType,
    pub chunking: ChunkingConfig,
}

/// Borrowed collaborators of a pipeline run.
pub(crate) struct Pipeline<'a> {
    pub extractor: &'a dyn TextExtractor,
    pub embedder: &'a Embedder,
    pub index: &'a dyn VectorIndex,
    pub states: &'a StateStore,
}

impl Pipeline<'_> {
    /// Runs `job` to a terminal state. Never leaves chunks behind on failure.
    #[instrument(skip_all, fields(source_id = %job.source_id, bytes = job.bytes.len()))]
    pub(crate) async fn run(&self, job: &IngestJob) {
        match self.process(job).await {
            Ok(n) => match self
                .states
                .apply(&job.source_id, IngestEvent::Completed { chunk_count: n })
            {
                Ok(_) => info!(chunks = n, "ingestion completed"),
                Err(e) => warn!(error = %e, "could not record completion"),
            },
            Err(e) => {
                error!(stage = e.stage(), error = %e, "ingestion failed");
                if let Err(cleanup) = self.index.remove(&job.source_id).await {
                    warn!(error = %cleanup, "cleanup after failed ingestion failed");
                }
                let failed = IngestEvent::Failed {
                    stage: e.stage(),
                    message: e.to_string(),
                };
                if let Err(e) = self.states.apply(&job.source_id, failed) {
                    warn!(error = %e, "could not record failure");
                }
            }
        }
    }

    async fn process(&self, job: &IngestJob) -> Result<usize, RagError> {
        let sid = job.source_id.as_str();

        let doc = self.extractor.extract(&job.bytes, job.file_type)?;
        let title = resolve_title(&doc, sid);
        let chunks = Chunker::new(job.chunking)?.chunk(&doc, sid, &title, job.file_type)?;
        let total = chunks.len();
        self.states.apply(
            sid,
            IngestEvent::Chunked {
                title: title.clone(),
                total,
            },
        )?;
        debug!(%title, total, "document chunked");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != total {
            return Err(RagError::EmbeddingUnavailable(format!(
                "{} vectors for {total} chunks",
                vectors.len()
            )));
        }
        let items: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
            .collect();
        let expected: Vec<String> = items.iter().map(|it| it.chunk.id.clone()).collect();

        // Previous version of the document, if any.
        let replaced = self.index.remove(sid).await?;
        if replaced > 0 {
            debug!(replaced, "previous chunks removed");
        }
        let written = self.index.add(items).await?;
        self.states
            .apply(sid, IngestEvent::Stored { count: written })?;

        let stored = self.index.get_chunks(sid).await?;
        verify(&stored, &expected)?;
        Ok(total)
    }
}

/// Checks what the index returns against what was written.
pub(crate) fn verify(stored: &[DocumentChunk], expected_ids: &[String]) -> Result<(), RagError> {
    let n = expected_ids.len();
    if stored.len() != n {
        return Err(RagError::Verification(format!(
            "expected {n} chunks, index holds {}",
            stored.len()
        )));
    }
    for (i, (c, id)) in stored.iter().zip(expected_ids).enumerate() {
        if c.chunk_index != i {
            return Err(RagError::Verification(format!(
                "chunk indices are not sequential at position {i} (found {})",
                c.chunk_index
            )));
        }
        if c.total_chunks != n {
            return Err(RagError::Verification(format!(
                "chunk {i} reports total_chunks={}, expected {n}",
                c.total_chunks
            )));
        }
        if &c.id != id {
            return Err(RagError::Verification(format!("chunk {i} has unexpected id")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_chunk;

    fn doc(n: usize) -> Vec<DocumentChunk> {
        (0..n)
            .map(|i| {
                let mut c = sample_chunk("a.txt", i, &format!("part {i}"));
                c.total_chunks = n;
                c
            })
            .collect()
    }

    #[test]
    fn verify_accepts_a_complete_document() {
        let chunks = doc(3);
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        assert!(verify(&chunks, &ids).is_ok());
    }

    #[test]
    fn verify_rejects_gaps_and_counts() {
        let chunks = doc(3);
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        assert!(matches!(
            verify(&chunks[..2], &ids),
            Err(RagError::Verification(_))
        ));

        let mut gap = chunks.clone();
        gap[1].chunk_index = 2;
        assert!(verify(&gap, &ids).is_err());

        let mut wrong_total = chunks;
        wrong_total[2].total_chunks = 4;
        assert!(verify(&wrong_total, &ids).is_err());
    }

    #[tokio::test]
    async fn source_locks_serialize_same_source() {
        let locks = SourceLocks::default();
        let g = locks.lock("a.txt").await;

        // A different source is not blocked.
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.lock("b.txt"),
        )
        .await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.lock("a.txt"),
        )
        .await;
        assert!(same.is_err());

        drop(g);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("a.txt"))
                .await
                .is_ok()
        );
    }
}
