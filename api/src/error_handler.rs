use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contextor::ContextorError;
use rag_store::RagError;
use thiserror::Error;
use tracing::error;

use crate::core::http::response_envelope::ApiResponse;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error("config error: {0}")]
    Config(String),

    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Rich HTTP error mapped from lower layers with specific status & code.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Http { status, .. } => *status,
            // startup-only
            AppError::Config(_) | AppError::Bind(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Http { code, .. } => code,
        }
    }

    fn http(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        AppError::Http {
            status,
            code,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), error = %self, "request failed");
        }
        ApiResponse::error(status, self.error_code(), self.to_string()).into_response()
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

/// Oversized bodies surface here too; all upload failures are client errors.
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::http(StatusCode::BAD_REQUEST, "BAD_UPLOAD", err.body_text())
    }
}

/// Store errors carry their HTTP meaning in the variant.
impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(_) | RagError::Config(_) => {
                AppError::http(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err)
            }
            RagError::UnsupportedFileType(_) => {
                AppError::http(StatusCode::BAD_REQUEST, "UNSUPPORTED_FILE_TYPE", err)
            }
            RagError::NotFound(_) => AppError::http(StatusCode::NOT_FOUND, "DOCUMENT_NOT_FOUND", err),
            RagError::AlreadyProcessing(_) => {
                AppError::http(StatusCode::CONFLICT, "ALREADY_PROCESSING", err)
            }
            RagError::ResetInProgress(_) => {
                AppError::http(StatusCode::CONFLICT, "RESET_IN_PROGRESS", err)
            }
            RagError::EmbeddingUnavailable(_) => {
                AppError::http(StatusCode::BAD_GATEWAY, "EMBEDDING_UNAVAILABLE", err)
            }
            RagError::Qdrant(_) => AppError::http(StatusCode::BAD_GATEWAY, "INDEX_UNAVAILABLE", err),
            _ => AppError::http(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", err),
        }
    }
}

impl From<ContextorError> for AppError {
    fn from(err: ContextorError) -> Self {
        match err {
            ContextorError::Rag(e) => e.into(),
            ContextorError::Validation(_) | ContextorError::Config(_) => {
                AppError::http(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err)
            }
            ContextorError::OracleUnavailable { .. } => {
                AppError::http(StatusCode::BAD_GATEWAY, "LLM_UNAVAILABLE", err)
            }
            ContextorError::GenerationRejected(_) => {
                AppError::http(StatusCode::BAD_GATEWAY, "GENERATION_REJECTED", err)
            }
            _ => AppError::http(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (RagError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (RagError::UnsupportedFileType("pdf".into()), StatusCode::BAD_REQUEST),
            (RagError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (RagError::AlreadyProcessing("a".into()), StatusCode::CONFLICT),
            (RagError::ResetInProgress("a".into()), StatusCode::CONFLICT),
            (RagError::EmbeddingUnavailable("down".into()), StatusCode::BAD_GATEWAY),
            (RagError::Verification("short".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, want) in cases {
            assert_eq!(AppError::from(err).status_code(), want);
        }
    }

    #[test]
    fn contextor_errors_keep_store_meaning() {
        let e: AppError = ContextorError::Rag(RagError::NotFound("a".into())).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(e.error_code(), "DOCUMENT_NOT_FOUND");

        let e: AppError = ContextorError::GenerationRejected("uncited".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);

        let e: AppError = ContextorError::Validation("empty".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }
}
