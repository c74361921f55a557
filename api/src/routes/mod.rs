pub mod ask;
pub mod documents;
pub mod settings;
pub mod system;
pub mod titles;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderMap,
    middleware,
    routing::{get, post},
};

use crate::{core::app_state::AppState, middleware_layer::json_extractor::json_error_mapper};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_SLACK: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_SLACK);

    Router::new()
        .route(
            "/documents",
            post(documents::upload_document_route::upload_document_route)
                .get(documents::list_documents_route::list_documents_route),
        )
        .route(
            "/documents/{source_id}",
            axum::routing::delete(documents::delete_document_route::delete_document_route),
        )
        .route(
            "/documents/{source_id}/status",
            get(documents::document_status_route::document_status_route),
        )
        .route(
            "/documents/{source_id}/chunks",
            get(documents::document_chunks_route::document_chunks_route),
        )
        .route("/titles", get(titles::search_titles_route::search_titles_route))
        .route("/ask", post(ask::ask_question_route::ask_question_route))
        .route(
            "/settings",
            get(settings::settings_route::get_settings_route)
                .put(settings::settings_route::update_settings_route),
        )
        .route("/health", get(system::health_route::health_route))
        .route("/reset", post(system::reset_route::reset_route))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(state)
}

/// `X-Request-Id` for log correlation, `-` when absent.
pub(crate) fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("X-Request-Id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use ai_llm_service::{LlmModelConfig, LlmProvider, service_profiles::LlmServiceProfiles};
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use contextor::{Contextor, ContextorConfig, ContextorError, GenerationOracle, RelevanceOracle};
    use futures::future::BoxFuture;
    use rag_store::{HashingEmbedder, RagConfig, RagStore};
    use serde_json::Value;

    use crate::core::app_state::AppState;

    /// Rates every passage 7/10.
    pub(crate) struct FixedRelevance;

    impl RelevanceOracle for FixedRelevance {
        fn score<'a>(
            &'a self,
            _query: &'a str,
            passages: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<f32>, ContextorError>> {
            Box::pin(async move { Ok(vec![7.0; passages.len()]) })
        }
    }

    /// Always cites the first source.
    pub(crate) struct CitingGeneration;

    impl GenerationOracle for CitingGeneration {
        fn generate<'a>(
            &'a self,
            _system: &'a str,
            _prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, ContextorError>> {
            Box::pin(async { Ok("[Source 1] The handbook grants twenty vacation days.".into()) })
        }
    }

    /// Unreachable endpoint: health checks fail fast without network access.
    fn offline_profile(model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: model.into(),
            endpoint: "http://127.0.0.1:9".into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
            timeout_secs: Some(1),
        }
    }

    pub(crate) async fn state() -> Arc<AppState> {
        let store = RagStore::open(RagConfig::in_memory(), Arc::new(HashingEmbedder::new(64)))
            .await
            .unwrap();
        let contextor = Contextor::new(
            store,
            ContextorConfig::default(),
            Arc::new(FixedRelevance),
            Arc::new(CitingGeneration),
        )
        .unwrap();
        let llm = LlmServiceProfiles::new(
            offline_profile("fast"),
            offline_profile("main"),
            offline_profile("embed"),
            Some(1),
        )
        .unwrap();
        Arc::new(AppState::new(Arc::new(contextor), Arc::new(llm)))
    }

    /// Completed ingestion of a small text document.
    pub(crate) async fn seed(state: &AppState, name: &str, body: &str) {
        state
            .contextor
            .store()
            .ingest_and_wait(body.as_bytes().to_vec(), name, None)
            .await
            .unwrap();
    }

    pub(crate) async fn body_json(res: impl IntoResponse) -> (StatusCode, Value) {
        let res = res.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}
