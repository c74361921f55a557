use std::sync::Arc;

use axum::extract::State;
use rag_store::DocumentInfo;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

/// `GET /documents`: every known document with its processing status.
pub async fn list_documents_route(State(state): State<Arc<AppState>>) -> AppResult<ApiResponse<Vec<DocumentInfo>>> {
    let documents = state.contextor.list_documents().await?;
    Ok(ApiResponse::ok(documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};

    #[tokio::test]
    async fn lists_completed_documents() {
        let state = state().await;
        seed(&state, "b.txt", "Beta\n\nSecond body.").await;
        seed(&state, "a.txt", "Alpha\n\nFirst body.").await;

        let (_, body) = body_json(list_documents_route(State(state)).await.unwrap()).await;
        let docs = body["data"].as_array().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d["status"] == "completed"));
        assert!(docs.iter().any(|d| d["source_id"] == "a.txt" && d["title"] == "Alpha"));
    }
}
