//! Oracle seams for ranking and synthesis, plus the LLM-backed implementation.

use std::sync::Arc;

use ai_llm_service::service_profiles::LlmServiceProfiles;
use futures::future::BoxFuture;
use tracing::{debug, instrument};

use crate::error::ContextorError;
use crate::prompt;

/// Rates passages for relevance to a query on the configured scale.
pub trait RelevanceOracle: Send + Sync {
    /// Returns one raw rating per passage, in order.
    fn score<'a>(
        &'a self,
        query: &'a str,
        passages: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<f32>, ContextorError>>;
}

/// Produces the final answer text.
pub trait GenerationOracle: Send + Sync {
    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ContextorError>>;
}

/// Both oracles over [`LlmServiceProfiles`] (relevance + generation profiles).
#[derive(Clone)]
pub struct LlmOracle {
    svc: Arc<LlmServiceProfiles>,
}

impl LlmOracle {
    pub fn new(svc: Arc<LlmServiceProfiles>) -> Self {
        Self { svc }
    }
}

impl RelevanceOracle for LlmOracle {
    #[instrument(skip_all, fields(passages = passages.len()))]
    fn score<'a>(
        &'a self,
        query: &'a str,
        passages: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<f32>, ContextorError>> {
        Box::pin(async move {
            let body = prompt::relevance_prompt(query, passages);
            let raw = self
                .svc
                .generate_relevance(&body, Some(prompt::RELEVANCE_SYSTEM))
                .await
                .map_err(|e| ContextorError::OracleUnavailable {
                    stage: "relevance",
                    reason: e.to_string(),
                })?;
            debug!(chars = raw.len(), "relevance response received");
            prompt::parse_scores(&raw, passages.len()).ok_or_else(|| {
                ContextorError::OracleUnavailable {
                    stage: "relevance",
                    reason: format!("unparseable scores for {} passages", passages.len()),
                }
            })
        })
    }
}

impl GenerationOracle for LlmOracle {
    #[instrument(skip_all, fields(prompt_chars = prompt.len()))]
    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ContextorError>> {
        Box::pin(async move {
            self.svc
                .generate_answer(prompt, Some(system))
                .await
                .map_err(|e| ContextorError::OracleUnavailable {
                    stage: "generation",
                    reason: e.to_string(),
                })
        })
    }
}
