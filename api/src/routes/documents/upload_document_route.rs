use std::sync::Arc;

use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::HeaderMap,
};
use rag_store::{FileType, ProcessingState};
use tracing::{debug, info};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::request_id,
};

/// Multipart part carrying the document.
const FILE_FIELD: &str = "file";
/// Optional part overriding the type derived from the file name.
const FILE_TYPE_FIELD: &str = "file_type";

/// One parsed upload.
pub(crate) struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub file_type: Option<FileType>,
}

/// `POST /documents`: accepts the upload and answers `202` with the
/// `processing` state; ingestion continues in the background.
pub async fn upload_document_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<ApiResponse<ProcessingState>> {
    let request_id = request_id(&headers);
    let multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let upload = read_upload(multipart, state.max_upload_bytes).await?;
    debug!(
        request_id = %request_id,
        name = %upload.name,
        bytes = upload.bytes.len(),
        "upload_document_route: received"
    );
    accept_upload(&state, upload)
}

pub(crate) fn accept_upload(state: &AppState, upload: Upload) -> AppResult<ApiResponse<ProcessingState>> {
    let processing = state
        .contextor
        .ingest(upload.bytes, &upload.name, upload.file_type)?;
    info!(source_id = %processing.source_id, "upload accepted");
    Ok(ApiResponse::accepted(processing))
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> AppResult<Upload> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut file_type = None;

    while let Some(mut field) = multipart.next_field().await? {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some(FILE_FIELD) => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if bytes.len() + chunk.len() > limit {
                        return Err(AppError::BadRequest(format!(
                            "{name} exceeds the upload limit of {limit} bytes"
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file = Some((name, bytes));
            }
            Some(FILE_TYPE_FIELD) => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    file_type = Some(FileType::from_name(raw.trim())?);
                }
            }
            _ => {}
        }
    }

    let (name, bytes) = file.ok_or_else(|| {
        AppError::BadRequest(format!("multipart field '{FILE_FIELD}' is required"))
    })?;
    Ok(Upload {
        name,
        bytes,
        file_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, state};
    use axum::http::StatusCode;

    fn upload(name: &str, body: &str) -> Upload {
        Upload {
            name: name.into(),
            bytes: body.as_bytes().to_vec(),
            file_type: None,
        }
    }

    #[tokio::test]
    async fn accepted_upload_answers_202_processing() {
        let state = state().await;
        let res = accept_upload(&state, upload("notes.txt", "Notes\n\nSome text.")).unwrap();
        let (status, body) = body_json(res).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["source_id"], "notes.txt");
        assert_eq!(body["data"]["status"], "processing");
    }

    #[tokio::test]
    async fn rejected_uploads_are_client_errors() {
        let state = state().await;

        let err = accept_upload(&state, upload("slides.pptx", "x")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "UNSUPPORTED_FILE_TYPE");

        let err = accept_upload(&state, upload("empty.txt", "")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
