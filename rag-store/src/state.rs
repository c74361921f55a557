//! Processing-state store for document ingestion.
//!
//! Every mutation goes through [`transition`], so the lifecycle is:
//!
//! ```text
//! (none | completed | error) --Started--> processing
//! processing --Chunked / Stored--> processing
//! processing --Completed--> completed
//! processing --Failed--> error
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::record::SourceSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Lifecycle record of one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    pub source_id: String,
    pub status: ProcessingStatus,
    /// Title, once extraction has run.
    pub title: Option<String>,
    /// Chunks stored so far.
    pub chunk_count: usize,
    /// Chunks the document was split into.
    pub total_chunks: usize,
    /// Only set when `status == Error`.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Events emitted by the ingestion pipeline.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    Started,
    Chunked { title: String, total: usize },
    Stored { count: usize },
    Completed { chunk_count: usize },
    Failed { stage: &'static str, message: String },
}

/// Pure transition function.
///
/// # Errors
/// [`RagError::AlreadyProcessing`] for `Started` on a processing document,
/// [`RagError::InvalidTransition`] for any other event outside `processing`.
pub fn transition(
    current: Option<&ProcessingState>,
    source_id: &str,
    event: IngestEvent,
    now: DateTime<Utc>,
) -> Result<ProcessingState, RagError> {
    let invalid = |detail: &str| RagError::InvalidTransition {
        source_id: source_id.to_string(),
        detail: detail.to_string(),
    };

    match (current, event) {
        (Some(s), IngestEvent::Started) if s.status == ProcessingStatus::Processing => {
            Err(RagError::AlreadyProcessing(source_id.to_string()))
        }
        (_, IngestEvent::Started) => Ok(ProcessingState {
            source_id: source_id.to_string(),
            status: ProcessingStatus::Processing,
            title: None,
            chunk_count: 0,
            total_chunks: 0,
            error: None,
            started_at: now,
            updated_at: now,
        }),
        (None, _) => Err(invalid("event before Started")),
        (Some(s), _) if s.status.is_terminal() => {
            Err(invalid(&format!("document is already {:?}", s.status)))
        }
        (Some(s), IngestEvent::Chunked { title, total }) => Ok(ProcessingState {
            title: Some(title),
            total_chunks: total,
            updated_at: now,
            ..s.clone()
        }),
        (Some(s), IngestEvent::Stored { count }) => Ok(ProcessingState {
            chunk_count: count,
            updated_at: now,
            ..s.clone()
        }),
        (Some(s), IngestEvent::Completed { chunk_count }) => Ok(ProcessingState {
            status: ProcessingStatus::Completed,
            chunk_count,
            updated_at: now,
            ..s.clone()
        }),
        (Some(s), IngestEvent::Failed { stage, message }) => Ok(ProcessingState {
            status: ProcessingStatus::Error,
            chunk_count: 0,
            error: Some(format!("{stage} failed: {message}")),
            updated_at: now,
            ..s.clone()
        }),
    }
}

/// Keyed store of [`ProcessingState`]s.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<HashMap<String, ProcessingState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `event` atomically and returns the new state.
    pub fn apply(&self, source_id: &str, event: IngestEvent) -> Result<ProcessingState, RagError> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = transition(map.get(source_id), source_id, event, Utc::now())?;
        debug!(source_id, status = ?next.status, "processing state updated");
        map.insert(source_id.to_string(), next.clone());
        Ok(next)
    }

    pub fn get(&self, source_id: &str) -> Option<ProcessingState> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
    }

    /// All states, sorted by source id.
    pub fn all(&self) -> Vec<ProcessingState> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        out.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        out
    }

    /// Sources whose chunks must stay invisible.
    pub fn processing_sources(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.status == ProcessingStatus::Processing)
            .map(|s| s.source_id.clone())
            .collect()
    }

    pub fn is_processing(&self, source_id: &str) -> bool {
        self.get(source_id)
            .is_some_and(|s| s.status == ProcessingStatus::Processing)
    }

    /// Records already-indexed documents as completed (startup).
    pub fn seed_completed(&self, sources: &[SourceSummary]) {
        let now = Utc::now();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for s in sources {
            if s.chunk_count != s.total_chunks {
                warn!(
                    source_id = %s.source_id,
                    chunk_count = s.chunk_count,
                    total_chunks = s.total_chunks,
                    "indexed document looks incomplete"
                );
            }
            map.entry(s.source_id.clone())
                .or_insert_with(|| ProcessingState {
                    source_id: s.source_id.clone(),
                    status: ProcessingStatus::Completed,
                    title: Some(s.title.clone()),
                    chunk_count: s.chunk_count,
                    total_chunks: s.total_chunks,
                    error: None,
                    started_at: now,
                    updated_at: now,
                });
        }
    }

    pub fn remove(&self, source_id: &str) -> Option<ProcessingState> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source_id)
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
