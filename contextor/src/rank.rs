//! Two-stage ranking: vector similarity, then cached model relevance.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rag_store::VectorHit;
use tracing::{debug, info, instrument, warn};

use crate::api_types::SearchResult;
use crate::cache::{CacheKey, ResponseCache};
use crate::cfg::ContextorConfig;
use crate::error::ContextorError;
use crate::llm::RelevanceOracle;

/// Stage 2 scorer.
pub struct Ranker {
    oracle: Arc<dyn RelevanceOracle>,
    cache: Arc<ResponseCache>,
    similarity_weight: f32,
    relevance_weight: f32,
    scale: f32,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
}

impl Ranker {
    pub fn new(
        cfg: &ContextorConfig,
        oracle: Arc<dyn RelevanceOracle>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            oracle,
            cache,
            similarity_weight: cfg.similarity_weight,
            relevance_weight: cfg.relevance_weight,
            scale: cfg.relevance_scale,
            batch_size: cfg.rerank_batch_size.max(1),
            concurrency: cfg.rerank_concurrency.max(1),
            timeout: cfg.relevance_timeout,
        }
    }

    /// Scores `hits` and returns the best `k`, ordered by descending combined
    /// score with ties broken by ascending chunk id.
    ///
    /// Never fails: a batch the oracle cannot rate falls back to
    /// `relevance = similarity` and is not cached.
    #[instrument(skip_all, fields(candidates = hits.len(), k = k))]
    pub async fn rerank(&self, query: &str, hits: Vec<VectorHit>, k: usize) -> Vec<SearchResult> {
        if hits.is_empty() || k == 0 {
            return Vec::new();
        }
        let query = query.trim();

        let keys: Vec<CacheKey> = hits
            .iter()
            .map(|h| CacheKey::relevance(query, &h.chunk.text))
            .collect();
        let mut relevance: Vec<Option<f32>> = keys.iter().map(|k| self.cache.relevance(k)).collect();

        let misses: Vec<usize> = (0..hits.len()).filter(|&i| relevance[i].is_none()).collect();
        debug!(
            cached = hits.len() - misses.len(),
            misses = misses.len(),
            "relevance cache lookup"
        );

        let rated: Vec<(Vec<usize>, Result<Vec<f32>, ContextorError>)> = stream::iter(
            misses.chunks(self.batch_size).map(<[usize]>::to_vec),
        )
        .map(|batch| {
            let passages: Vec<String> = batch.iter().map(|&i| hits[i].chunk.text.clone()).collect();
            async move {
                let res = match tokio::time::timeout(
                    self.timeout,
                    self.oracle.score(query, &passages),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(ContextorError::OracleUnavailable {
                        stage: "relevance",
                        reason: format!("timed out after {:?}", self.timeout),
                    }),
                };
                (batch, res)
            }
        })
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        for (batch, res) in rated {
            match res {
                Ok(scores) if scores.len() == batch.len() => {
                    for (&i, raw) in batch.iter().zip(scores) {
                        let norm = (raw / self.scale).clamp(0.0, 1.0);
                        self.cache.put_relevance(keys[i], norm);
                        relevance[i] = Some(norm);
                    }
                }
                Ok(scores) => warn!(
                    got = scores.len(),
                    want = batch.len(),
                    "relevance count mismatch, falling back to similarity"
                ),
                Err(e) => warn!(error = %e, batch = batch.len(), "relevance batch failed, falling back to similarity"),
            }
        }

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .zip(relevance)
            .map(|(hit, rel)| {
                let relevance_score = rel.unwrap_or(hit.similarity);
                SearchResult {
                    chunk_id: hit.chunk.id.clone(),
                    text: hit.chunk.text.clone(),
                    combined_score: self.similarity_weight * hit.similarity
                        + self.relevance_weight * relevance_score,
                    similarity_score: hit.similarity,
                    relevance_score,
                    metadata: hit.chunk,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(k);
        info!(
            kept = results.len(),
            top = results.first().map(|r| r.combined_score),
            "rerank done"
        );
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use rag_store::DocumentChunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rates by the number in the passage text after `score=`; counts calls.
    pub(crate) struct ScriptedRelevance {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl ScriptedRelevance {
        pub(crate) fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl RelevanceOracle for ScriptedRelevance {
        fn score<'a>(
            &'a self,
            _query: &'a str,
            passages: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<f32>, ContextorError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(ContextorError::OracleUnavailable {
                        stage: "relevance",
                        reason: "connection refused".into(),
                    });
                }
                Ok(passages
                    .iter()
                    .map(|p| {
                        p.split("score=")
                            .nth(1)
                            .and_then(|s| s.split_whitespace().next())
                            .and_then(|s| s.parse().ok())
                            .unwrap_or(0.0)
                    })
                    .collect())
            })
        }
    }

    fn hit(id: &str, text: &str, distance: f32) -> VectorHit {
        VectorHit::new(
            DocumentChunk {
                id: id.into(),
                text: text.into(),
                source_id: "a.txt".into(),
                chunk_index: 0,
                total_chunks: 1,
                char_start: 0,
                char_end: text.len(),
                section_title: None,
                section_type: None,
                title: "A".into(),
                file_type: "txt".into(),
            },
            distance,
        )
    }

    fn ranker(oracle: Arc<ScriptedRelevance>, batch: usize) -> (Ranker, Arc<ResponseCache>) {
        let cache = Arc::new(ResponseCache::new(100, true));
        let cfg = ContextorConfig {
            rerank_batch_size: batch,
            ..Default::default()
        };
        (Ranker::new(&cfg, oracle, cache.clone()), cache)
    }

    #[tokio::test]
    async fn relevance_reorders_candidates() {
        let oracle = Arc::new(ScriptedRelevance::new(false));
        let (r, _) = ranker(oracle, 2);
        let out = r
            .rerank(
                "q",
                vec![
                    hit("1", "close but useless score=0", 0.1),
                    hit("2", "farther but on point score=10", 0.3),
                    hit("3", "middling score=5", 0.2),
                ],
                2,
            )
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].chunk_id, "2");
        assert!((out[0].relevance_score - 1.0).abs() < 1e-6);
        assert!((out[0].combined_score - (0.4 * 0.7 + 0.6 * 1.0)).abs() < 1e-5);
        assert_eq!(out[1].chunk_id, "3");
    }

    #[tokio::test]
    async fn second_rerank_hits_the_cache() {
        let oracle = Arc::new(ScriptedRelevance::new(false));
        let (r, _) = ranker(oracle.clone(), 1);
        let hits = vec![hit("1", "a score=3", 0.2), hit("2", "b score=9", 0.4)];

        let first = r.rerank("Q", hits.clone(), 5).await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);

        let second = r.rerank("  q ", hits, 5).await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);

        let scores = |v: &[SearchResult]| -> Vec<(String, f32)> {
            v.iter().map(|r| (r.chunk_id.clone(), r.combined_score)).collect()
        };
        assert_eq!(scores(&first), scores(&second));
    }

    #[tokio::test]
    async fn failing_oracle_falls_back_to_similarity() {
        let oracle = Arc::new(ScriptedRelevance::new(true));
        let (r, cache) = ranker(oracle, 8);
        let out = r
            .rerank(
                "q",
                vec![
                    hit("b", "second score=10", 0.30),
                    hit("a", "first score=0", 0.10),
                    hit("c", "third", 0.50),
                ],
                3,
            )
            .await;

        let ids: Vec<&str> = out.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for r in &out {
            assert_eq!(r.relevance_score, r.similarity_score);
        }
        assert_eq!(cache.len(), (0, 0));
    }

    /// Never answers.
    struct StalledRelevance;

    impl RelevanceOracle for StalledRelevance {
        fn score<'a>(
            &'a self,
            _query: &'a str,
            _passages: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<f32>, ContextorError>> {
            Box::pin(futures::future::pending::<Result<Vec<f32>, ContextorError>>())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out_to_similarity() {
        let cache = Arc::new(ResponseCache::new(100, true));
        let cfg = ContextorConfig {
            relevance_timeout: Duration::from_secs(3),
            ..Default::default()
        };
        let r = Ranker::new(&cfg, Arc::new(StalledRelevance), cache.clone());

        let out = r
            .rerank(
                "q",
                vec![hit("b", "second", 0.30), hit("a", "first", 0.10)],
                2,
            )
            .await;

        let ids: Vec<&str> = out.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(out.iter().all(|r| r.relevance_score == r.similarity_score));
        assert_eq!(cache.len(), (0, 0));
    }

    #[tokio::test]
    async fn ties_break_on_id() {
        let oracle = Arc::new(ScriptedRelevance::new(false));
        let (r, _) = ranker(oracle, 8);
        let out = r
            .rerank(
                "q",
                vec![hit("z", "x score=5", 0.2), hit("m", "y score=5", 0.2)],
                2,
            )
            .await;
        assert_eq!(out[0].chunk_id, "m");
    }
}
