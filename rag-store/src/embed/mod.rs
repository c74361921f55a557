use crate::errors::RagError;
use std::{future::Future, pin::Pin};

/// Asynchronous embedding provider.
///
/// Async is required because real providers (Ollama, OpenAI) perform HTTP
/// requests. Implementations must return exactly one vector per input, in
/// input order, and must be deterministic for a given text.
pub trait EmbeddingsProvider: Send + Sync {
    /// Embeds one batch of texts.
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>>;
}

pub mod hashing;
pub mod llm;
