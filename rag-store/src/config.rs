//! Runtime, chunking, and index backend configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Default upload cap (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Unit in which `chunk_size` and `chunk_overlap` are measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    /// Unicode scalar values.
    Char,
    /// Unicode word-bound segments, whitespace excluded.
    Token,
}

impl std::str::FromStr for SizeUnit {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "char" | "chars" | "character" => Ok(Self::Char),
            "token" | "tokens" => Ok(Self::Token),
            other => Err(RagError::Config(format!("unknown chunk unit: {other}"))),
        }
    }
}

/// Chunking knobs. Changeable at runtime through settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub unit: SizeUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            unit: SizeUnit::Char,
        }
    }
}

impl ChunkingConfig {
    /// `chunk_size >= 100` and `chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size < 100 {
            return Err(RagError::Validation(format!(
                "chunk_size must be at least 100, got {}",
                self.chunk_size
            )));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Where chunk vectors live.
#[derive(Clone, Debug)]
pub enum IndexBackend {
    /// Process memory, optionally mirrored to a JSON snapshot file.
    Memory { snapshot: Option<PathBuf> },
    /// A Qdrant collection.
    Qdrant {
        url: String,
        api_key: Option<String>,
        collection: String,
        /// Exact search flag (false = HNSW ANN).
        exact: bool,
    },
}

/// Configuration for ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub backend: IndexBackend,
    /// Pinned vector dimension; learned from the first embedding when `None`.
    pub embedding_dim: Option<usize>,
    /// Texts per embedding request.
    pub embedding_batch: usize,
    /// Embedding requests in flight.
    pub embedding_concurrency: usize,
    pub chunking: ChunkingConfig,
    pub max_upload_bytes: usize,
}

impl RagConfig {
    /// In-memory index without snapshot and default knobs.
    pub fn in_memory() -> Self {
        Self {
            backend: IndexBackend::Memory { snapshot: None },
            embedding_dim: None,
            embedding_batch: 32,
            embedding_concurrency: 4,
            chunking: ChunkingConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Reads `INDEX_BACKEND`, `INDEX_SNAPSHOT_PATH`, `QDRANT_*`, `RAG_EXACT_SEARCH`,
    /// `EMBEDDING_DIM`, `EMBEDDING_BATCH_SIZE`, `EMBEDDING_CONCURRENCY`,
    /// `CHUNK_SIZE`, `CHUNK_OVERLAP`, `CHUNK_UNIT` and `MAX_UPLOAD_BYTES`.
    ///
    /// # Errors
    /// Unknown backend or unit names, or values failing [`RagConfig::validate`].
    pub fn from_env() -> Result<Self, RagError> {
        let backend = match env("INDEX_BACKEND", "memory").to_ascii_lowercase().as_str() {
            "memory" => IndexBackend::Memory {
                snapshot: opt_env("INDEX_SNAPSHOT_PATH").map(PathBuf::from),
            },
            "qdrant" => IndexBackend::Qdrant {
                url: env("QDRANT_URL", "http://127.0.0.1:6334"),
                api_key: opt_env("QDRANT_API_KEY"),
                collection: env("QDRANT_COLLECTION", "documents"),
                exact: env("RAG_EXACT_SEARCH", "false") == "true",
            },
            other => return Err(RagError::Config(format!("unknown INDEX_BACKEND: {other}"))),
        };

        let defaults = ChunkingConfig::default();
        let chunking = ChunkingConfig {
            chunk_size: parse("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: parse("CHUNK_OVERLAP", defaults.chunk_overlap),
            unit: env("CHUNK_UNIT", "char").parse()?,
        };

        let cfg = Self {
            backend,
            embedding_dim: opt_env("EMBEDDING_DIM").and_then(|s| s.trim().parse().ok()),
            embedding_batch: parse("EMBEDDING_BATCH_SIZE", 32usize),
            embedding_concurrency: parse("EMBEDDING_CONCURRENCY", 4usize),
            chunking,
            max_upload_bytes: parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if let IndexBackend::Qdrant {
            url, collection, ..
        } = &self.backend
        {
            if url.trim().is_empty() {
                return Err(RagError::Config("qdrant url is empty".into()));
            }
            if collection.trim().is_empty() {
                return Err(RagError::Config("collection is empty".into()));
            }
        }
        if self.embedding_dim == Some(0) {
            return Err(RagError::Config("EMBEDDING_DIM must be > 0".into()));
        }
        if self.embedding_batch == 0 || self.embedding_concurrency == 0 {
            return Err(RagError::Config(
                "embedding batch size and concurrency must be > 0".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(RagError::Config("MAX_UPLOAD_BYTES must be > 0".into()));
        }
        self.chunking.validate()
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k).unwrap_or_else(|_| dflt.to_string())
}

fn opt_env(k: &str) -> Option<String> {
    std::env::var(k).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}
