//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RagError {
    /// I/O or filesystem errors (snapshot file).
    #[error("[RAG Store] io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("[RAG Store] parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or unsupported configuration.
    #[error("[RAG Store] config error: {0}")]
    Config(String),

    /// Input rejected before any pipeline work.
    #[error("[RAG Store] validation error: {0}")]
    Validation(String),

    /// File type has no extractor.
    #[error("[RAG Store] unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Bytes could not be turned into text.
    #[error("[RAG Store] extraction failed: {0}")]
    Extraction(String),

    /// Text produced no usable chunks.
    #[error("[RAG Store] chunking failed: {0}")]
    Chunking(String),

    /// Embedding oracle failed or returned unusable vectors.
    #[error("[RAG Store] embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Mismatch in vector dimensionality across records.
    #[error("[RAG Store] vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Qdrant client errors (wrapped).
    #[error("[RAG Store] qdrant error: {0}")]
    Qdrant(String),

    /// Unknown document.
    #[error("[RAG Store] document not found: {0}")]
    NotFound(String),

    /// A second ingestion of a source that is still processing.
    #[error("[RAG Store] document is already processing: {0}")]
    AlreadyProcessing(String),

    /// Upload arrived while `reset_all` is clearing the store.
    #[error("[RAG Store] reset in progress, retry {0} later")]
    ResetInProgress(String),

    /// Processing-state event not allowed in the current status.
    #[error("[RAG Store] invalid state transition for {source_id}: {detail}")]
    InvalidTransition { source_id: String, detail: String },

    /// Re-read after write did not match what was written.
    #[error("[RAG Store] verification failed: {0}")]
    Verification(String),
}

impl RagError {
    /// Pipeline stage name used in `ProcessingState::error` messages.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType(_) | Self::Extraction(_) => "extraction",
            Self::Chunking(_) => "chunking",
            Self::EmbeddingUnavailable(_) | Self::VectorSizeMismatch { .. } => "embedding",
            Self::Verification(_) => "verification",
            Self::Qdrant(_) | Self::Io(_) | Self::Parse(_) => "index write",
            _ => "ingestion",
        }
    }
}
