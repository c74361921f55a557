//! Qdrant-backed [`VectorIndex`].
//!
//! This facade concentrates all Qdrant interactions behind the index trait,
//! hiding away the verbose builder pattern and keeping the rest of the
//! crate decoupled from `qdrant-client`.
//!
//! Chunks are stored as points with id = chunk UUID and the serialized
//! [`DocumentChunk`] as payload. The collection is created lazily on the
//! first write, once the vector size is known.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, ScrollPointsBuilder,
    SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QValue,
    VectorParamsBuilder, vectors_config,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info, warn};

use crate::errors::RagError;
use crate::filters::{SOURCE_FIELD, source_filter, to_qdrant_filter};
use crate::index::{VectorIndex, rank_hits, summarize};
use crate::record::{DocumentChunk, EmbeddedChunk, SearchFilter, SourceSummary, VectorHit};

const SCROLL_PAGE: u32 = 256;

/// A facade over the Qdrant client to keep the rest of the code clean and stable.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    exact: bool,
    /// Vector size of the collection once known.
    ready: Mutex<Option<usize>>,
}

impl QdrantIndex {
    /// Builds the client; does not touch the server.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
        exact: bool,
    ) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(qerr("client build"))?;

        Ok(Self {
            client,
            collection: collection.into(),
            exact,
            ready: Mutex::new(None),
        })
    }

    async fn exists(&self) -> Result<bool, RagError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(qerr("collection_exists"))
    }

    /// Ensures that the collection exists with vectors of `dim`.
    async fn ensure_collection(&self, dim: usize) -> Result<(), RagError> {
        if let Some(have) = self.cached_dim() {
            return check_dim(dim, have);
        }
        if let Some(have) = self.fetch_dimension().await? {
            check_dim(dim, have)?;
            self.set_cached_dim(Some(have));
            return Ok(());
        }

        info!(
            "Creating collection '{}' with size={} distance=cosine",
            self.collection, dim
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(qerr("create_collection"))?;

        // Keyword index keeps source filters cheap; search works without it.
        if let Err(e) = self
            .client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                SOURCE_FIELD,
                FieldType::Keyword,
            ))
            .await
        {
            warn!(error = %e, "could not create source_id payload index");
        }

        self.set_cached_dim(Some(dim));
        Ok(())
    }

    fn cached_dim(&self) -> Option<usize> {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_cached_dim(&self, dim: Option<usize>) {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner) = dim;
    }

    async fn fetch_dimension(&self) -> Result<Option<usize>, RagError> {
        if !self.exists().await? {
            return Ok(None);
        }
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(qerr("collection_info"))?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|cfg| match cfg {
                vectors_config::Config::Params(p) => Some(p.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            });
        Ok(size)
    }

    /// Reads every point matching `filter` (all points when `None`).
    async fn scroll_all(&self, filter: Option<Filter>) -> Result<Vec<DocumentChunk>, RagError> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut offset = None;
        loop {
            let mut req = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(f) = filter.clone() {
                req = req.filter(f);
            }
            if let Some(o) = offset.take() {
                req = req.offset(o);
            }
            let page = self.client.scroll(req).await.map_err(qerr("scroll"))?;
            for p in page.result {
                out.push(payload_to_chunk(p.payload)?);
            }
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    /// Resolves the title filter and the explicit source set into one allow-list.
    async fn allowed_sources(&self, f: &SearchFilter) -> Result<Option<Vec<String>>, RagError> {
        let Some(needle) = f.title_contains.as_deref().map(|t| t.trim().to_lowercase()) else {
            return Ok(f.source_ids.clone());
        };
        let by_title: HashSet<String> = self
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.title.to_lowercase().contains(&needle))
            .map(|s| s.source_id)
            .collect();
        let allowed = match &f.source_ids {
            Some(ids) => ids.iter().filter(|s| by_title.contains(*s)).cloned().collect(),
            None => by_title.into_iter().collect(),
        };
        Ok(Some(allowed))
    }
}

impl VectorIndex for QdrantIndex {
    fn add<'a>(&'a self, items: Vec<EmbeddedChunk>) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            let Some(first) = items.first() else {
                return Ok(0);
            };
            let dim = first.vector.len();
            if let Some(bad) = items.iter().find(|it| it.vector.len() != dim) {
                return Err(RagError::VectorSizeMismatch {
                    got: bad.vector.len(),
                    want: dim,
                });
            }
            self.ensure_collection(dim).await?;

            let mut points = Vec::with_capacity(items.len());
            for it in items {
                let payload = Payload::try_from(serde_json::to_value(&it.chunk)?)
                    .map_err(qerr("payload convert"))?;
                points.push(PointStruct::new(it.chunk.id, it.vector, payload));
            }
            let n = points.len();

            info!(
                "Upserting {} points into collection '{}'",
                n, self.collection
            );
            // One request per document: Qdrant applies it as a single operation.
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(qerr("upsert_points"))?;
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
            if k == 0 || !self.exists().await? {
                return Ok(Vec::new());
            }
            let allowed = self.allowed_sources(filter).await?;
            if allowed.as_ref().is_some_and(Vec::is_empty) {
                return Ok(Vec::new());
            }

            // Extra candidates let equal scores be re-ordered by id.
            let limit = (k as u64).saturating_mul(2).max(k as u64 + 4);
            let mut req = SearchPointsBuilder::new(&self.collection, query.to_vec(), limit)
                .with_payload(true);
            if let Some(f) = to_qdrant_filter(filter, allowed) {
                req = req.filter(f);
            }
            if self.exact {
                req = req.params(SearchParamsBuilder::default().exact(true));
            }

            let res = self
                .client
                .search_points(req)
                .await
                .map_err(qerr("search_points"))?;

            let mut hits = Vec::with_capacity(res.result.len());
            for p in res.result {
                let chunk = payload_to_chunk(p.payload)?;
                hits.push(VectorHit::new(chunk, cosine_score_to_distance(p.score)));
            }
            debug!("Search completed: {} raw hits", hits.len());
            Ok(rank_hits(hits, k))
        })
    }

    fn remove<'a>(&'a self, source_id: &'a str) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            if !self.exists().await? {
                return Ok(0);
            }
            let count = self
                .client
                .count(
                    CountPointsBuilder::new(&self.collection)
                        .filter(source_filter(source_id))
                        .exact(true),
                )
                .await
                .map_err(qerr("count"))?
                .result
                .map_or(0, |r| r.count as usize);
            if count == 0 {
                return Ok(0);
            }
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.collection)
                        .points(source_filter(source_id))
                        .wait(true),
                )
                .await
                .map_err(qerr("delete_points"))?;
            Ok(count)
        })
    }

    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<SourceSummary>, RagError>> {
        Box::pin(async move {
            let chunks = self.scroll_all(None).await?;
            Ok(summarize(chunks.iter()))
        })
    }

    fn get_chunks<'a>(
        &'a self,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RagError>> {
        Box::pin(async move {
            let mut chunks = self.scroll_all(Some(source_filter(source_id))).await?;
            chunks.sort_by_key(|c| c.chunk_index);
            Ok(chunks)
        })
    }

    fn reset(&self) -> BoxFuture<'_, Result<(), RagError>> {
        Box::pin(async move {
            if self.exists().await? {
                self.client
                    .delete_collection(&self.collection)
                    .await
                    .map_err(qerr("delete_collection"))?;
                info!("Collection '{}' dropped", self.collection);
            }
            // The next add recreates the collection with whatever size it brings.
            self.set_cached_dim(None);
            Ok(())
        })
    }

    fn dimension(&self) -> BoxFuture<'_, Result<Option<usize>, RagError>> {
        Box::pin(self.fetch_dimension())
    }
}

fn check_dim(got: usize, want: usize) -> Result<(), RagError> {
    if got == want {
        Ok(())
    } else {
        Err(RagError::VectorSizeMismatch { got, want })
    }
}

fn qerr<E: std::fmt::Display>(op: &'static str) -> impl Fn(E) -> RagError {
    move |e| RagError::Qdrant(format!("{op}: {e}"))
}

/// Converts a Qdrant payload back into the stored chunk.
fn payload_to_chunk(payload: HashMap<String, QValue>) -> Result<DocumentChunk, RagError> {
    let map: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(k, v)| (k, v.into_json()))
        .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(map))?)
}

/// Qdrant reports cosine similarity as the score; the index speaks distances.
fn cosine_score_to_distance(score: f32) -> f32 {
    1.0 - score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_distance;
    use crate::record::sample_chunk;

    #[test]
    fn scores_map_to_the_memory_index_distance() {
        let q = [1.0, 0.0];
        for (v, cos) in [([2.0, 0.0], 1.0), ([0.0, 1.0], 0.0), ([1.0, 1.0], 0.5f32.sqrt())] {
            let d = cosine_score_to_distance(cos);
            assert!((d - cosine_distance(&q, &v)).abs() < 1e-6);
        }
        assert!(cosine_score_to_distance(0.9) < cosine_score_to_distance(0.1));
    }

    #[test]
    fn payload_round_trips_through_qdrant_values() {
        let chunk = sample_chunk("a.txt", 3, "some text");
        let payload = Payload::try_from(serde_json::to_value(&chunk).unwrap()).unwrap();
        let map: HashMap<String, QValue> = payload.into();
        assert_eq!(payload_to_chunk(map).unwrap(), chunk);
    }

    #[test]
    fn dimension_check() {
        assert!(check_dim(3, 3).is_ok());
        assert!(matches!(
            check_dim(2, 3),
            Err(RagError::VectorSizeMismatch { got: 2, want: 3 })
        ));
    }
}
