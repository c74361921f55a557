//! LLM provider layer shared by the ingestion and question-answering crates.
//!
//! Three logical profiles are exposed through [`service_profiles::LlmServiceProfiles`]:
//! - **relevance**: fast model that scores candidate passages,
//! - **generation**: model that writes cited answers,
//! - **embedding**: model that turns text into vectors.
//!
//! Providers: local Ollama and the OpenAI REST API.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
pub use error_handler::{AiLlmError, Result};
