//! In-memory [`VectorIndex`] with optional JSON snapshot persistence.
//!
//! Writes validate the whole batch first and then swap it in under one
//! short write lock, so readers never observe half of an `add`. When a
//! snapshot path is set, every mutation rewrites the file through a temp
//! file + rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::errors::RagError;
use crate::index::{VectorIndex, cosine_distance, rank_hits, summarize};
use crate::record::{DocumentChunk, EmbeddedChunk, SearchFilter, SourceSummary, VectorHit};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    dim: Option<usize>,
    points: BTreeMap<String, EmbeddedChunk>,
}

pub struct MemoryIndex {
    state: RwLock<MemoryState>,
    snapshot: Option<PathBuf>,
    persist: Mutex<()>,
}

impl MemoryIndex {
    /// Empty, non-persistent index.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            snapshot: None,
            persist: Mutex::new(()),
        }
    }

    /// Opens an index mirrored to `path`, loading it when the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: MemoryState = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    points = state.points.len(),
                    "loaded index snapshot"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path),
            persist: Mutex::new(()),
        })
    }

    async fn persist(&self) -> Result<(), RagError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        // Serialize under the persist lock so files are written in mutation order.
        let _guard = self.persist.lock().await;
        let bytes = serde_json::to_vec(&*self.state.read().await)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "index snapshot written");
        Ok(())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex for MemoryIndex {
    fn add<'a>(&'a self, items: Vec<EmbeddedChunk>) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            if items.is_empty() {
                return Ok(0);
            }
            let n = items.len();
            {
                let mut st = self.state.write().await;
                let want = st.dim.unwrap_or(items[0].vector.len());
                if let Some(bad) = items.iter().find(|it| it.vector.len() != want) {
                    return Err(RagError::VectorSizeMismatch {
                        got: bad.vector.len(),
                        want,
                    });
                }
                st.dim = Some(want);
                for it in items {
                    st.points.insert(it.chunk.id.clone(), it);
                }
            }
            self.persist().await?;
            debug!(points = n, "memory index add");
            Ok(n)
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        filter: &'a SearchFilter,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, RagError>> {
        Box::pin(async move {
            let st = self.state.read().await;
            if let Some(want) = st.dim {
                if query.len() != want {
                    return Err(RagError::VectorSizeMismatch {
                        got: query.len(),
                        want,
                    });
                }
            }
            let hits = st
                .points
                .values()
                .filter(|p| filter.accepts(&p.chunk))
                .map(|p| VectorHit::new(p.chunk.clone(), cosine_distance(query, &p.vector)))
                .collect();
            Ok(rank_hits(hits, k))
        })
    }

    fn remove<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            let removed = {
                let mut st = self.state.write().await;
                let before = st.points.len();
                st.points.retain(|_, p| p.chunk.source_id != source_id);
                if st.points.is_empty() {
                    st.dim = None;
                }
                before - st.points.len()
            };
            if removed > 0 {
                self.persist().await?;
            }
            Ok(removed)
        })
    }

    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<SourceSummary>, RagError>> {
        Box::pin(async move {
            let st = self.state.read().await;
            Ok(summarize(st.points.values().map(|p| &p.chunk)))
        })
    }

    fn get_chunks<'a>(
        &'a self,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RagError>> {
        Box::pin(async move {
            let st = self.state.read().await;
            let mut out: Vec<DocumentChunk> = st
                .points
                .values()
                .filter(|p| p.chunk.source_id == source_id)
                .map(|p| p.chunk.clone())
                .collect();
            out.sort_by_key(|c| c.chunk_index);
            Ok(out)
        })
    }

    fn reset(&self) -> BoxFuture<'_, Result<(), RagError>> {
        Box::pin(async move {
            *self.state.write().await = MemoryState::default();
            self.persist().await
        })
    }

    fn dimension(&self) -> BoxFuture<'_, Result<Option<usize>, RagError>> {
        Box::pin(async move { Ok(self.state.read().await.dim) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_chunk;

    fn item(source: &str, idx: usize, v: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: sample_chunk(source, idx, &format!("{source} chunk {idx}")),
            vector: v,
        }
    }

    #[tokio::test]
    async fn search_ranks_and_filters() {
        let idx = MemoryIndex::new();
        idx.add(vec![
            item("a.txt", 0, vec![1.0, 0.0]),
            item("a.txt", 1, vec![0.7, 0.7]),
            item("b.txt", 0, vec![0.9, 0.1]),
        ])
        .await
        .unwrap();

        let all = idx.search(&[1.0, 0.0], 2, &SearchFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].chunk.source_id, "a.txt");
        assert!(all[0].similarity >= all[1].similarity);

        let only_b = SearchFilter {
            source_ids: Some(vec!["b.txt".into()]),
            ..Default::default()
        };
        let hits = idx.search(&[1.0, 0.0], 5, &only_b).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk.source_id == "b.txt"));

        let nothing = SearchFilter {
            source_ids: Some(vec!["nonexistent".into()]),
            ..Default::default()
        };
        assert!(idx.search(&[1.0, 0.0], 5, &nothing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected_atomically() {
        let idx = MemoryIndex::new();
        idx.add(vec![item("a.txt", 0, vec![1.0, 0.0])]).await.unwrap();

        let err = idx
            .add(vec![
                item("b.txt", 0, vec![1.0, 0.0]),
                item("b.txt", 1, vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::VectorSizeMismatch { got: 3, want: 2 }));
        assert!(idx.get_chunks("b.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunks_are_ordered_and_removable() {
        let idx = MemoryIndex::new();
        idx.add(vec![
            item("a.txt", 2, vec![1.0, 0.0]),
            item("a.txt", 0, vec![1.0, 0.0]),
            item("a.txt", 1, vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

        let order: Vec<usize> = idx
            .get_chunks("a.txt")
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(idx.get_chunks("missing.txt").await.unwrap().is_empty());

        assert_eq!(idx.remove("a.txt").await.unwrap(), 3);
        assert!(idx.list_sources().await.unwrap().is_empty());
        assert_eq!(idx.dimension().await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let idx = MemoryIndex::open(&path).await.unwrap();
        idx.add(vec![item("a.txt", 0, vec![0.0, 1.0])]).await.unwrap();
        drop(idx);

        let reopened = MemoryIndex::open(&path).await.unwrap();
        let sources = reopened.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_id, "a.txt");
        assert_eq!(reopened.dimension().await.unwrap(), Some(2));

        reopened.reset().await.unwrap();
        let empty = MemoryIndex::open(&path).await.unwrap();
        assert!(empty.list_sources().await.unwrap().is_empty());
    }
}
