//! Public API types re-used by external crates (e.g., the HTTP API layer).

use rag_store::{ChunkingConfig, DocumentChunk, SizeUnit};
use serde::{Deserialize, Serialize};

/// One question with optional pre-selection.
///
/// # Example
/// ```
/// use contextor::AskRequest;
/// let req: AskRequest = serde_json::from_str(r#"{"query":"What is the leave policy?"}"#).unwrap();
/// assert!(req.source_ids.is_none());
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AskRequest {
    pub query: String,
    /// Only these documents; an empty list means no restriction.
    #[serde(default)]
    pub source_ids: Option<Vec<String>>,
    /// Case-insensitive substring of the document title.
    #[serde(default)]
    pub title_filter: Option<String>,
    /// Overrides `RAG_TOP_K`.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// A ranked chunk. Produced per query, never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: DocumentChunk,
    /// `clamp(1 - cosine distance, 0, 1)`.
    pub similarity_score: f32,
    /// In `[0, 1]`.
    pub relevance_score: f32,
    pub combined_score: f32,
}

/// A source referenced by the answer as `[Source N]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub number: usize,
    pub source_id: String,
    pub title: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Answer {
    pub answer_text: String,
    /// In order of first mention.
    pub citations: Vec<Citation>,
    /// `true` when the answer came from the response cache.
    pub cached: bool,
    /// The chunks the answer was built from.
    pub results: Vec<SearchResult>,
}

/// Runtime-adjustable settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub cache: CacheSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Capacity per table; fixed at startup.
    pub size: usize,
}

/// Partial update; absent fields keep their value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
    #[serde(default)]
    pub unit: Option<SizeUnit>,
    #[serde(default)]
    pub cache_enabled: Option<bool>,
}
