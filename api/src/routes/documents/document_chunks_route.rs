use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use rag_store::DocumentChunk;
use tracing::debug;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::request_id,
};

/// `GET /documents/{source_id}/chunks`: chunks in index order; empty for
/// unknown or still-processing documents.
pub async fn document_chunks_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> AppResult<ApiResponse<Vec<DocumentChunk>>> {
    let chunks = state.contextor.get_chunks(&source_id).await?;
    debug!(
        request_id = %request_id(&headers),
        source_id = %source_id,
        chunks = chunks.len(),
        "document_chunks_route: done"
    );
    Ok(ApiResponse::ok(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};

    #[tokio::test]
    async fn chunks_come_back_in_order() {
        let state = state().await;
        seed(
            &state,
            "a.txt",
            "Alpha\n\nFirst paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.",
        )
        .await;

        let res = document_chunks_route(State(state.clone()), HeaderMap::new(), Path("a.txt".into()))
            .await
            .unwrap();
        let (_, body) = body_json(res).await;
        let chunks = body["data"].as_array().unwrap();
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c["chunk_index"], i);
            assert_eq!(c["total_chunks"], chunks.len());
        }

        let res = document_chunks_route(State(state), HeaderMap::new(), Path("nope.txt".into()))
            .await
            .unwrap();
        let (_, body) = body_json(res).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    }
}
