//! Runtime configuration loaded from environment variables.

use std::time::Duration;

use crate::error::ContextorError;

/// Config bag for retrieval, ranking and caching. All fields have defaults via `from_env`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextorConfig {
    // Retrieval knobs
    pub top_k: usize,
    /// Largest `top_k` a request may ask for.
    pub max_top_k: usize,
    /// Stage 1 fetches `top_k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub balance_sources: bool,

    // Ranking
    pub similarity_weight: f32,
    pub relevance_weight: f32,
    /// Upper bound of the oracle's rating scale (ratings are divided by it).
    pub relevance_scale: f32,
    pub rerank_batch_size: usize,
    pub rerank_concurrency: usize,
    pub relevance_timeout: Duration,
    pub generation_timeout: Duration,

    // Cache
    pub cache_enabled: bool,
    pub cache_capacity: usize,
}

impl Default for ContextorConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_top_k: 100,
            candidate_multiplier: 2,
            balance_sources: true,
            similarity_weight: 0.4,
            relevance_weight: 0.6,
            relevance_scale: 10.0,
            rerank_batch_size: 8,
            rerank_concurrency: 4,
            relevance_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(90),
            cache_enabled: true,
            cache_capacity: 1000,
        }
    }
}

impl ContextorConfig {
    /// Build from environment variables with the defaults above.
    ///
    /// Reads `RAG_TOP_K`, `RAG_MAX_TOP_K`, `CANDIDATE_MULTIPLIER`, `BALANCE_SOURCES`,
    /// `SIMILARITY_WEIGHT`, `RELEVANCE_WEIGHT`, `RELEVANCE_SCALE`,
    /// `RERANK_BATCH_SIZE`, `RERANK_CONCURRENCY`, `RELEVANCE_TIMEOUT_SECS`,
    /// `GENERATION_TIMEOUT_SECS`, `CACHE_ENABLED` and `CACHE_SIZE`.
    pub fn from_env() -> Result<Self, ContextorError> {
        let d = Self::default();
        let cfg = Self {
            top_k: parse("RAG_TOP_K", d.top_k),
            max_top_k: parse("RAG_MAX_TOP_K", d.max_top_k),
            candidate_multiplier: parse("CANDIDATE_MULTIPLIER", d.candidate_multiplier),
            balance_sources: env("BALANCE_SOURCES", "true") == "true",
            similarity_weight: parse("SIMILARITY_WEIGHT", d.similarity_weight),
            relevance_weight: parse("RELEVANCE_WEIGHT", d.relevance_weight),
            relevance_scale: parse("RELEVANCE_SCALE", d.relevance_scale),
            rerank_batch_size: parse("RERANK_BATCH_SIZE", d.rerank_batch_size),
            rerank_concurrency: parse("RERANK_CONCURRENCY", d.rerank_concurrency),
            relevance_timeout: Duration::from_secs(parse("RELEVANCE_TIMEOUT_SECS", 30u64)),
            generation_timeout: Duration::from_secs(parse("GENERATION_TIMEOUT_SECS", 90u64)),
            cache_enabled: env("CACHE_ENABLED", "true") == "true",
            cache_capacity: parse("CACHE_SIZE", d.cache_capacity),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ContextorError> {
        let bad = |m: &str| Err(ContextorError::Config(m.to_string()));
        if self.top_k == 0 || self.candidate_multiplier == 0 {
            return bad("RAG_TOP_K and CANDIDATE_MULTIPLIER must be > 0");
        }
        if self.top_k > self.max_top_k {
            return bad("RAG_TOP_K must not exceed RAG_MAX_TOP_K");
        }
        if self.rerank_batch_size == 0 || self.rerank_concurrency == 0 {
            return bad("RERANK_BATCH_SIZE and RERANK_CONCURRENCY must be > 0");
        }
        let weights_ok = [self.similarity_weight, self.relevance_weight]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0);
        if !weights_ok || self.similarity_weight + self.relevance_weight <= 0.0 {
            return bad("ranking weights must be non-negative and not both zero");
        }
        if !(self.relevance_scale.is_finite() && self.relevance_scale > 0.0) {
            return bad("RELEVANCE_SCALE must be > 0");
        }
        if self.relevance_timeout.is_zero() || self.generation_timeout.is_zero() {
            return bad("oracle timeouts must be > 0");
        }
        if self.cache_capacity == 0 {
            return bad("CACHE_SIZE must be > 0");
        }
        Ok(())
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k).unwrap_or_else(|_| dflt.to_string())
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ContextorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.similarity_weight, 0.4);
        assert_eq!(cfg.relevance_weight, 0.6);
        assert_eq!(cfg.cache_capacity, 1000);
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_weights = ContextorConfig {
            similarity_weight: 0.0,
            relevance_weight: 0.0,
            ..Default::default()
        };
        assert!(zero_weights.validate().is_err());

        let no_scale = ContextorConfig {
            relevance_scale: 0.0,
            ..Default::default()
        };
        assert!(no_scale.validate().is_err());

        let top_k_over_cap = ContextorConfig {
            top_k: 20,
            max_top_k: 10,
            ..Default::default()
        };
        assert!(top_k_over_cap.validate().is_err());
    }
}
