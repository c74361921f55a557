use std::sync::Arc;

use axum::{
    extract::{Path, State},
};

use rag_store::ProcessingState;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

/// `GET /documents/{source_id}/status`
pub async fn document_status_route(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> AppResult<ApiResponse<ProcessingState>> {
    let processing = state.contextor.ingest_status(&source_id)?;
    Ok(ApiResponse::ok(processing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn reports_terminal_state_and_404_for_unknown() {
        let state = state().await;
        seed(&state, "a.txt", "Alpha\n\nOne.\n\nTwo.").await;

        let res = document_status_route(State(state.clone()), Path("a.txt".into()))
            .await
            .unwrap();
        let (status, body) = body_json(res).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["chunk_count"], body["data"]["total_chunks"]);

        let err = document_status_route(State(state), Path("missing.txt".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
