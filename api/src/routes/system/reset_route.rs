use std::sync::Arc;

use axum::{extract::State, http::HeaderMap};
use serde::Serialize;
use tracing::warn;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::request_id,
};

#[derive(Serialize)]
pub struct ResetResponse {
    pub message: &'static str,
}

/// `POST /reset`: drops every document, state and cached response.
pub async fn reset_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<ApiResponse<ResetResponse>> {
    warn!(request_id = %request_id(&headers), "reset requested");
    state.contextor.reset_all().await?;
    Ok(ApiResponse::ok(ResetResponse {
        message: "All documents removed",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{seed, state};

    #[tokio::test]
    async fn reset_empties_the_store() {
        let state = state().await;
        seed(&state, "a.txt", "Alpha\n\nBody.").await;

        reset_route(State(state.clone()), HeaderMap::new()).await.unwrap();
        assert!(state.contextor.list_documents().await.unwrap().is_empty());
    }
}
