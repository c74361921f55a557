//! Default LLM configs loaded from environment variables.
//!
//! Three roles are resolved for the provider named by `LLM_KIND`:
//!
//! - **Relevance**  → fast model that scores passages 0–10
//! - **Generation** → model that writes the cited answer
//! - **Embedding**  → embedding generator
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = `ollama` (default) or `openai`
//! - `LLM_MAX_TOKENS` = max answer tokens (default 1000)
//! - `LLM_TEMPERATURE` = answer temperature (default 0.3)
//! - `LLM_SEED` = sampling seed (default 42)
//! - `LLM_TIMEOUT_SECS` = HTTP timeout (default 120)
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL` = generation model (mandatory)
//! - `OLLAMA_MODEL_FAST` = relevance model (falls back to `OLLAMA_MODEL`)
//! - `EMBEDDING_MODEL` = embedding model (mandatory)
//!
//! OpenAI:
//! - `OPENAI_API_KEY` (mandatory)
//! - `OPENAI_URL` (default `https://api.openai.com`)
//! - `OPENAI_MODEL` (default `gpt-3.5-turbo`)
//! - `OPENAI_MODEL_FAST` (falls back to `OPENAI_MODEL`)
//! - `EMBEDDING_MODEL` (default `text-embedding-3-small`)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt_f32, env_opt_u32, env_opt_u64, must_env, opt_env,
    },
};

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_SEED: u64 = 42;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_EMBEDDING: &str = "text-embedding-3-small";

/// Provider selected by `LLM_KIND` (Ollama when unset).
pub fn provider_from_env() -> Result<LlmProvider, AiLlmError> {
    match opt_env("LLM_KIND") {
        Some(kind) => Ok(kind.parse::<LlmProvider>()?),
        None => Ok(LlmProvider::Ollama),
    }
}

/// Resolves the Ollama endpoint strictly from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
///
/// # Errors
///
/// - [`ConfigError::MissingVar`] if both are missing
/// - [`ConfigError::InvalidNumber`] if `OLLAMA_PORT` is invalid
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Some(url) = opt_env("OLLAMA_URL") {
        return Ok(url);
    }
    if let Some(port) = opt_env("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    Err(ConfigError::MissingVar("OLLAMA_URL or OLLAMA_PORT").into())
}

/// Endpoint, key and model names for the configured provider.
struct ProviderBase {
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    generation_model: String,
    relevance_model: String,
    embedding_model: String,
}

fn provider_base() -> Result<ProviderBase, AiLlmError> {
    match provider_from_env()? {
        LlmProvider::Ollama => {
            let generation_model = must_env("OLLAMA_MODEL")?;
            let relevance_model =
                opt_env("OLLAMA_MODEL_FAST").unwrap_or_else(|| generation_model.clone());
            Ok(ProviderBase {
                provider: LlmProvider::Ollama,
                endpoint: ollama_endpoint()?,
                api_key: None,
                relevance_model,
                generation_model,
                embedding_model: must_env("EMBEDDING_MODEL")?,
            })
        }
        LlmProvider::OpenAI => {
            let generation_model =
                opt_env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
            let relevance_model =
                opt_env("OPENAI_MODEL_FAST").unwrap_or_else(|| generation_model.clone());
            Ok(ProviderBase {
                provider: LlmProvider::OpenAI,
                endpoint: opt_env("OPENAI_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
                api_key: Some(must_env("OPENAI_API_KEY")?),
                relevance_model,
                generation_model,
                embedding_model: opt_env("EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING.to_string()),
            })
        }
    }
}

/// Config for the **generation** profile (cited answers).
///
/// # Defaults
/// - `temperature = 0.3`, `seed = 42`, `max_tokens = 1000`
pub fn config_generation() -> Result<LlmModelConfig, AiLlmError> {
    let base = provider_base()?;
    let cfg = LlmModelConfig {
        provider: base.provider,
        model: base.generation_model,
        endpoint: base.endpoint,
        api_key: base.api_key,
        max_tokens: Some(env_opt_u32("LLM_MAX_TOKENS")?.unwrap_or(DEFAULT_MAX_TOKENS)),
        temperature: Some(env_opt_f32("LLM_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE)),
        top_p: None,
        seed: Some(env_opt_u64("LLM_SEED")?.unwrap_or(DEFAULT_SEED)),
        timeout_secs: Some(env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS)),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Config for the **relevance** profile (0–10 passage scores).
///
/// # Defaults
/// - `temperature = 0.0` (scores must be repeatable), `seed = 42`, `max_tokens = 256`
pub fn config_relevance() -> Result<LlmModelConfig, AiLlmError> {
    let base = provider_base()?;
    let cfg = LlmModelConfig {
        provider: base.provider,
        model: base.relevance_model,
        endpoint: base.endpoint,
        api_key: base.api_key,
        max_tokens: Some(256),
        temperature: Some(0.0),
        top_p: None,
        seed: Some(env_opt_u64("LLM_SEED")?.unwrap_or(DEFAULT_SEED)),
        timeout_secs: Some(env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS)),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Config for the **embedding** profile.
///
/// # Defaults
/// - `temperature = None`, `max_tokens = None`, `timeout_secs = 60`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let base = provider_base()?;
    let cfg = LlmModelConfig {
        provider: base.provider,
        model: base.embedding_model,
        endpoint: base.endpoint,
        api_key: base.api_key,
        max_tokens: None,
        temperature: None,
        top_p: None,
        seed: None,
        timeout_secs: Some(60),
    };
    cfg.validate()?;
    Ok(cfg)
}
