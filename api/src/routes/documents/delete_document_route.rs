use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Serialize;
use tracing::info;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::request_id,
};

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub source_id: String,
    pub deleted_chunks: usize,
}

/// `DELETE /documents/{source_id}`: `404` for unknown documents, `409` while
/// the document is still processing.
pub async fn delete_document_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> AppResult<ApiResponse<DeleteDocumentResponse>> {
    let deleted_chunks = state.contextor.delete_document(&source_id).await?;
    info!(
        request_id = %request_id(&headers),
        source_id = %source_id,
        deleted_chunks,
        "document deleted"
    );
    Ok(ApiResponse::ok(DeleteDocumentResponse {
        source_id,
        deleted_chunks,
    }))
}
