//! Health checks for the configured LLM backends.
//!
//! - Ollama: `GET {endpoint}/api/tags`, then a best-effort model existence check
//! - OpenAI: `GET {endpoint}/v1/models` with Bearer auth, same model check
//!
//! [`HealthService::check`] never fails; errors become `ok = false` statuses so
//! the result can be served directly from a `/health` route.

use std::time::{Duration, Instant};

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, HealthError, HttpError, make_snippet};

/// A serializable health snapshot for a single profile.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Backend name (`"Ollama"`, `"OpenAI"`).
    pub provider: String,
    /// Target endpoint base URL.
    pub endpoint: String,
    /// Model the check looked for.
    pub model: String,
    /// Overall health flag.
    pub ok: bool,
    /// Check latency in milliseconds.
    pub latency_ms: u128,
    /// Short human-readable message with details.
    pub message: String,
}

impl HealthStatus {
    fn new(cfg: &LlmModelConfig, ok: bool, latency_ms: u128, message: impl Into<String>) -> Self {
        Self {
            provider: format!("{:?}", cfg.provider),
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            ok,
            latency_ms,
            message: message.into(),
        }
    }
}

/// Reuses one HTTP client for every check.
pub struct HealthService {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HealthService {
    /// Creates a new health service with an optional client timeout (seconds, default 10).
    ///
    /// # Errors
    /// Returns [`AiLlmError::HttpTransport`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, AiLlmError> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(10));
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!(default_timeout_secs = timeout.as_secs(), "HealthService initialized");
        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Checks one profile. Failures are folded into the returned status.
    pub async fn check(&self, cfg: &LlmModelConfig) -> HealthStatus {
        let start = Instant::now();
        let result = match cfg.provider {
            LlmProvider::Ollama => self.check_endpoint(cfg, "/api/tags", None).await,
            LlmProvider::OpenAI => match cfg.api_key.as_deref() {
                Some(key) => self.check_endpoint(cfg, "/v1/models", Some(key)).await,
                None => Err(HealthError::Decode("missing OpenAI API key".into()).into()),
            },
        };
        let latency = start.elapsed().as_millis();

        match result {
            Ok(true) => HealthStatus::new(cfg, true, latency, "backend is healthy; model is available"),
            Ok(false) => HealthStatus::new(cfg, false, latency, "backend is up, but model is not listed"),
            Err(err) => {
                warn!(
                    provider = ?cfg.provider,
                    endpoint = %cfg.endpoint,
                    error = %err,
                    "health check failed"
                );
                HealthStatus::new(cfg, false, latency, err.to_string())
            }
        }
    }

    /// Checks several profiles sequentially.
    pub async fn check_many(&self, configs: &[LlmModelConfig]) -> Vec<HealthStatus> {
        debug!(count = configs.len(), "running batch health checks");
        let mut out = Vec::with_capacity(configs.len());
        for cfg in configs {
            out.push(self.check(cfg).await);
        }
        out
    }

    /// Lists the backend's models and reports whether `cfg.model` is among them.
    async fn check_endpoint(
        &self,
        cfg: &LlmModelConfig,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<bool, AiLlmError> {
        let url = format!("{}{path}", cfg.endpoint.trim_end_matches('/'));
        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(self.default_timeout);

        debug!(provider = ?cfg.provider, model = %cfg.model, "GET {}", url);
        let mut req = self.client.get(&url).timeout(timeout);
        if let Some(key) = bearer {
            let value = header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| HealthError::Decode(format!("invalid API key header: {e}")))?;
            req = req.header(header::AUTHORIZATION, value);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HealthError::HttpStatus(HttpError {
                status,
                url,
                snippet: make_snippet(&text),
            })
            .into());
        }

        let listing: ModelListing = resp
            .json()
            .await
            .map_err(|e| HealthError::Decode(e.to_string()))?;
        Ok(listing.contains(&cfg.model))
    }
}

/// Accepts both `{ "models": [{ "name" }] }` (Ollama) and `{ "data": [{ "id" }] }` (OpenAI).
#[derive(Debug, Default, Deserialize)]
struct ModelListing {
    #[serde(default)]
    models: Vec<NamedModel>,
    #[serde(default)]
    data: Vec<IdModel>,
}

#[derive(Debug, Deserialize)]
struct NamedModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdModel {
    id: String,
}

impl ModelListing {
    fn contains(&self, model: &str) -> bool {
        // Ollama reports `name:latest` for untagged pulls.
        let tagged = format!("{model}:latest");
        self.models
            .iter()
            .any(|m| m.name == model || m.name == tagged)
            || self.data.iter().any(|m| m.id == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_matches_both_shapes() {
        let ollama: ModelListing =
            serde_json::from_str(r#"{"models":[{"name":"nomic-embed-text:latest"}]}"#).unwrap();
        assert!(ollama.contains("nomic-embed-text"));
        assert!(!ollama.contains("llama3"));

        let openai: ModelListing =
            serde_json::from_str(r#"{"data":[{"id":"gpt-3.5-turbo"}]}"#).unwrap();
        assert!(openai.contains("gpt-3.5-turbo"));
    }
}
