//! Embedding provider backed by the shared LLM service (Ollama or OpenAI).

use std::sync::Arc;

use ai_llm_service::service_profiles::LlmServiceProfiles;
use tracing::warn;

use crate::{EmbeddingsProvider, RagError};

/// Sends batches to the **embedding** profile of [`LlmServiceProfiles`].
#[derive(Clone)]
pub struct LlmEmbedder {
    svc: Arc<LlmServiceProfiles>,
}

impl LlmEmbedder {
    pub fn new(svc: Arc<LlmServiceProfiles>) -> Self {
        Self { svc }
    }
}

impl EmbeddingsProvider for LlmEmbedder {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Vec<f32>>, RagError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.svc.embed_batch(texts).await.map_err(|e| {
                warn!(batch = texts.len(), error = %e, "embedding request failed");
                RagError::EmbeddingUnavailable(e.to_string())
            })
        })
    }
}
