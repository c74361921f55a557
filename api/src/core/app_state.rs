use std::{env, net::SocketAddr, sync::Arc};

use ai_llm_service::service_profiles::LlmServiceProfiles;
use contextor::Contextor;

use crate::error_handler::AppError;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Documents, retrieval and answers.
    pub contextor: Arc<Contextor>,
    /// Model profiles, kept for health checks.
    pub llm: Arc<LlmServiceProfiles>,
    /// Largest accepted upload, mirrored from the store config.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(contextor: Arc<Contextor>, llm: Arc<LlmServiceProfiles>) -> Self {
        let max_upload_bytes = contextor.store().config().max_upload_bytes;
        Self {
            contextor,
            llm,
            max_upload_bytes,
        }
    }

    /// Builds the model profiles and the question-answering core from env.
    pub async fn from_env() -> Result<Self, AppError> {
        let llm = Arc::new(
            LlmServiceProfiles::from_env().map_err(|e| AppError::Config(e.to_string()))?,
        );
        let contextor = Contextor::from_env(llm.clone())
            .await
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(Self::new(Arc::new(contextor), llm))
    }
}

/// `API_ADDRESS`, defaulting to `0.0.0.0:8080`.
pub fn api_address() -> Result<SocketAddr, AppError> {
    let raw = env::var("API_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into());
    raw.parse()
        .map_err(|e| AppError::Config(format!("API_ADDRESS '{raw}' is invalid: {e}")))
}
