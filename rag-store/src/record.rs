//! Core data models used by the library.

use serde::{Deserialize, Serialize};

use crate::state::ProcessingStatus;

/// One stored piece of a document, with its position and structural hints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Char offset (inclusive) of the chunk inside the cleaned document.
    pub char_start: usize,
    /// Char offset (exclusive).
    pub char_end: usize,
    #[serde(default)]
    pub section_title: Option<String>,
    #[serde(default)]
    pub section_type: Option<String>,
    pub title: String,
    pub file_type: String,
}

/// A chunk together with its vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// Pre-selection applied before nearest-neighbour ranking.
///
/// All present constraints must hold for a chunk to be a candidate.
#[derive(Clone, Debug, Default)]
pub struct SearchFilter {
    /// Exact source ids; `None` means any source.
    pub source_ids: Option<Vec<String>>,
    /// Case-insensitive substring of the document title.
    pub title_contains: Option<String>,
    /// Sources that must never match (documents still processing).
    pub exclude_source_ids: Vec<String>,
}

impl SearchFilter {
    /// Returns `true` when `chunk` passes every constraint.
    pub fn accepts(&self, chunk: &DocumentChunk) -> bool {
        if self.exclude_source_ids.iter().any(|s| *s == chunk.source_id) {
            return false;
        }
        if let Some(ids) = &self.source_ids {
            if !ids.iter().any(|s| *s == chunk.source_id) {
                return false;
            }
        }
        match &self.title_contains {
            Some(needle) => chunk
                .title
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
            None => true,
        }
    }
}

/// A nearest-neighbour hit.
#[derive(Clone, Debug)]
pub struct VectorHit {
    pub chunk: DocumentChunk,
    /// Cosine distance (`1 - cosine similarity`).
    pub distance: f32,
    /// `clamp(1 - distance, 0, 1)`.
    pub similarity: f32,
}

impl VectorHit {
    pub fn new(chunk: DocumentChunk, distance: f32) -> Self {
        let similarity = (1.0 - distance).clamp(0.0, 1.0);
        Self {
            chunk,
            distance,
            similarity,
        }
    }
}

/// Per-document summary as stored in the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub total_chunks: usize,
}

/// Title search result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMatch {
    pub title: String,
    pub source_id: String,
}

/// Row of the document listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub source_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub total_chunks: usize,
    pub status: ProcessingStatus,
}

#[cfg(test)]
pub(crate) fn sample_chunk(source: &str, idx: usize, text: &str) -> DocumentChunk {
    DocumentChunk {
        id: services::uuid::chunk_uuid(source, idx, text).to_string(),
        text: text.to_string(),
        source_id: source.to_string(),
        chunk_index: idx,
        total_chunks: idx + 1,
        char_start: 0,
        char_end: text.chars().count(),
        section_title: None,
        section_type: Some("body".into()),
        title: format!("{source} title"),
        file_type: "txt".into(),
    }
}
