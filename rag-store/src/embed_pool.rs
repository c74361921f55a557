//! Embedding executor with batching, bounded concurrency and dimension checks.

use std::sync::{Arc, OnceLock};

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use crate::{embed::EmbeddingsProvider, errors::RagError};

/// Batches texts for an [`EmbeddingsProvider`] and validates what comes back.
///
/// The vector dimension is pinned by configuration or by the first successful
/// response; later vectors of another size are rejected.
pub struct Embedder {
    provider: Arc<dyn EmbeddingsProvider>,
    batch_size: usize,
    concurrency: usize,
    dim: OnceLock<usize>,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingsProvider>,
        batch_size: usize,
        concurrency: usize,
        dim: Option<usize>,
    ) -> Self {
        let pinned = OnceLock::new();
        if let Some(d) = dim {
            let _ = pinned.set(d);
        }
        Self {
            provider,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            dim: pinned,
        }
    }

    /// Dimension pinned so far, if any.
    pub fn dim(&self) -> Option<usize> {
        self.dim.get().copied()
    }

    /// Embeds `texts`; output order equals input order.
    ///
    /// # Errors
    /// [`RagError::EmbeddingUnavailable`] on provider failure, count mismatch,
    /// empty or non-finite vectors; [`RagError::VectorSizeMismatch`] when a
    /// vector disagrees with the pinned dimension.
    #[instrument(skip_all, fields(texts = texts.len()))]
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            "embed_texts: total={} batch={} concurrency={}",
            texts.len(),
            self.batch_size,
            self.concurrency
        );

        let jobs: Vec<_> = texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, batch)| async move {
                let vectors = self.provider.embed_batch(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(RagError::EmbeddingUnavailable(format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                for v in &vectors {
                    self.check(v)?;
                }
                Ok::<_, RagError>((i, vectors))
            })
            .collect();

        let mut batches: Vec<(usize, Vec<Vec<f32>>)> = stream::iter(jobs)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        batches.sort_by_key(|(i, _)| *i);
        let out: Vec<Vec<f32>> = batches.into_iter().flat_map(|(_, v)| v).collect();
        debug!("embed_texts: {} vectors ready", out.len());
        Ok(out)
    }

    /// Embeds a trimmed query. Case is kept, as it is for chunks.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Validation("query must not be empty".into()));
        }
        self.embed_texts(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("no vector for query".into()))
    }

    fn check(&self, v: &[f32]) -> Result<(), RagError> {
        if v.is_empty() {
            return Err(RagError::EmbeddingUnavailable("empty vector".into()));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(RagError::EmbeddingUnavailable(
                "vector contains NaN or infinite values".into(),
            ));
        }
        let want = *self.dim.get_or_init(|| v.len());
        if v.len() != want {
            return Err(RagError::VectorSizeMismatch { got: v.len(), want });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::hashing::HashingEmbedder;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `[index_of_text]`-shaped vectors and counts calls.
    struct Scripted {
        calls: AtomicUsize,
        poison_call: Option<usize>,
    }

    impl EmbeddingsProvider for Scripted {
        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if Some(n) == self.poison_call {
                    return Ok(texts.iter().map(|_| vec![f32::NAN, 1.0]).collect());
                }
                Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
            })
        }
    }

    #[tokio::test]
    async fn order_is_preserved_across_batches() {
        let provider = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            poison_call: None,
        });
        let emb = Embedder::new(provider.clone(), 2, 3, None);
        let texts: Vec<String> = (1..=7).map(|n| "x".repeat(n)).collect();

        let out = emb.embed_texts(&texts).await.unwrap();
        let lens: Vec<f32> = out.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        assert_eq!(emb.dim(), Some(2));
    }

    #[tokio::test]
    async fn nan_vectors_are_failures() {
        let provider = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            poison_call: Some(0),
        });
        let emb = Embedder::new(provider, 8, 1, None);
        let err = emb.embed_texts(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn pinned_dimension_is_enforced() {
        let emb = Embedder::new(Arc::new(HashingEmbedder::new(16)), 4, 1, Some(32));
        let err = emb.embed_texts(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::VectorSizeMismatch { got: 16, want: 32 }
        ));
    }

    /// Records every text it is asked to embed.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl EmbeddingsProvider for Recording {
        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>> {
            Box::pin(async move {
                self.seen.lock().unwrap().extend(texts.iter().cloned());
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            })
        }
    }

    #[tokio::test]
    async fn query_is_trimmed_but_keeps_its_case() {
        let provider = Arc::new(Recording::default());
        let emb = Embedder::new(provider.clone(), 4, 1, None);
        emb.embed_query("  What is RUST? ").await.unwrap();
        assert_eq!(
            *provider.seen.lock().unwrap(),
            vec!["What is RUST?".to_string()]
        );

        assert!(matches!(
            emb.embed_query("   ").await,
            Err(RagError::Validation(_))
        ));
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
    }
}
