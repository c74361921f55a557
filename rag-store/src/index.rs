//! Vector index abstraction shared by the in-memory and Qdrant backends.

use futures::future::BoxFuture;

use crate::errors::RagError;
use crate::record::{DocumentChunk, EmbeddedChunk, SearchFilter, SourceSummary, VectorHit};

/// Storage and nearest-neighbour search over chunk vectors.
///
/// Contract shared by every backend:
/// - `add` upserts by chunk id and is all-or-nothing per call;
/// - `search` orders by ascending cosine distance, ties by ascending id,
///   and applies the filter before ranking;
/// - `get_chunks` orders by `chunk_index` and returns an empty list for
///   unknown sources.
pub trait VectorIndex: Send + Sync {
    /// Returns the number of points written.
    fn add<'a>(&'a self, items: Vec<EmbeddedChunk>) -> BoxFuture<'a, Result<usize, RagError>>;

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        filter: &'a SearchFilter,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, RagError>>;

    /// Deletes every chunk of `source_id`; returns how many were removed.
    fn remove<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<usize, RagError>>;

    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<SourceSummary>, RagError>>;

    fn get_chunks<'a>(
        &'a self,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RagError>>;

    fn reset(&self) -> BoxFuture<'_, Result<(), RagError>>;

    /// Dimension of stored vectors, `None` while empty.
    fn dimension(&self) -> BoxFuture<'_, Result<Option<usize>, RagError>>;
}

/// Cosine distance `1 - cos(a, b)`; `1.0` when either vector has zero norm.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

/// Groups chunks into per-source summaries, sorted by source id.
pub(crate) fn summarize<'a>(chunks: impl Iterator<Item = &'a DocumentChunk>) -> Vec<SourceSummary> {
    let mut by_source: std::collections::BTreeMap<&str, SourceSummary> = Default::default();
    for c in chunks {
        let entry = by_source
            .entry(c.source_id.as_str())
            .or_insert_with(|| SourceSummary {
                source_id: c.source_id.clone(),
                title: c.title.clone(),
                chunk_count: 0,
                total_chunks: 0,
            });
        entry.chunk_count += 1;
        entry.total_chunks = entry.total_chunks.max(c.total_chunks);
    }
    by_source.into_values().collect()
}

/// Ranks hits by `(distance asc, id asc)` and keeps the first `k`.
pub(crate) fn rank_hits(mut hits: Vec<VectorHit>, k: usize) -> Vec<VectorHit> {
    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_chunk;

    #[test]
    fn cosine_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn ties_break_on_id() {
        let a = sample_chunk("a.txt", 0, "one");
        let b = sample_chunk("b.txt", 0, "two");
        let (lo, hi) = if a.id < b.id { (a, b) } else { (b, a) };
        let ranked = rank_hits(
            vec![VectorHit::new(hi.clone(), 0.2), VectorHit::new(lo.clone(), 0.2)],
            1,
        );
        assert_eq!(ranked[0].chunk.id, lo.id);
    }
}
