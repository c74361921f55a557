use std::sync::Arc;

use ai_llm_service::health_service::HealthStatus;
use axum::extract::State;
use rag_store::ProcessingStatus;
use serde::Serialize;
use tracing::warn;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every provider answered, `degraded` otherwise.
    pub status: &'static str,
    pub documents: usize,
    pub processing: usize,
    pub providers: Vec<HealthStatus>,
}

/// `GET /health`: checks each distinct model profile and counts documents.
pub async fn health_route(State(state): State<Arc<AppState>>) -> AppResult<ApiResponse<HealthResponse>> {
    let (providers, documents) =
        tokio::join!(state.llm.health_all(), state.contextor.list_documents());
    let documents = documents?;

    let healthy = providers.iter().all(|p| p.ok);
    if !healthy {
        for p in providers.iter().filter(|p| !p.ok) {
            warn!(provider = %p.provider, model = %p.model, message = %p.message, "provider unhealthy");
        }
    }

    Ok(ApiResponse::ok(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        processing: documents
            .iter()
            .filter(|d| d.status == ProcessingStatus::Processing)
            .count(),
        documents: documents.len(),
        providers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn unreachable_providers_mean_degraded() {
        let state = state().await;
        seed(&state, "a.txt", "Alpha\n\nBody.").await;

        let (status, body) = body_json(health_route(State(state)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "degraded");
        assert_eq!(body["data"]["documents"], 1);
        assert_eq!(body["data"]["processing"], 0);
        assert_eq!(body["data"]["providers"].as_array().map(Vec::len), Some(3));
    }
}
