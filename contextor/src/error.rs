//! Typed error for the contextor crate.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContextorError {
    /// Errors from the underlying rag-store crate.
    #[error("[Contextor] {0}")]
    Rag(#[from] rag_store::RagError),

    /// Rejected input (empty query, bad settings).
    #[error("[Contextor] validation error: {0}")]
    Validation(String),

    /// An oracle failed or timed out where no fallback exists.
    #[error("[Contextor] {stage} oracle unavailable: {reason}")]
    OracleUnavailable { stage: &'static str, reason: String },

    /// The generation oracle answered, but not with a usable cited answer.
    #[error("[Contextor] could not generate an answer: {0}")]
    GenerationRejected(String),

    /// Invalid configuration.
    #[error("[Contextor] config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ContextorError>;
