use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use contextor::{Answer, AskRequest};
use tracing::{debug, info};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::request_id,
};

/// `POST /ask`: cited answer plus the ranked chunks it was built from.
pub async fn ask_question_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> AppResult<ApiResponse<Answer>> {
    let request_id = request_id(&headers);
    let Json(req) = payload?;

    debug!(
        request_id = %request_id,
        query = %req.query,
        sources = req.source_ids.as_ref().map(Vec::len).unwrap_or(0),
        "ask_question_route: start"
    );

    let answer = state.contextor.ask(&req).await?;

    info!(
        request_id = %request_id,
        results = answer.results.len(),
        citations = answer.citations.len(),
        cached = answer.cached,
        "ask_question_route: success"
    );
    Ok(ApiResponse::ok(answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};
    use axum::http::StatusCode;

    fn ask(query: &str, sources: &[&str]) -> Json<AskRequest> {
        Json(AskRequest {
            query: query.into(),
            source_ids: Some(sources.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn answers_with_citations_then_from_cache() {
        let state = state().await;
        seed(&state, "handbook.txt", "Employee Handbook\n\nTwenty vacation days per year.").await;

        let res = ask_question_route(
            State(state.clone()),
            HeaderMap::new(),
            Ok(ask("How many vacation days?", &["handbook.txt"])),
        )
        .await
        .unwrap();
        let (status, body) = body_json(res).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["cached"], false);
        assert_eq!(body["data"]["citations"][0]["source_id"], "handbook.txt");
        assert!(!body["data"]["results"].as_array().unwrap().is_empty());

        let res = ask_question_route(
            State(state),
            HeaderMap::new(),
            Ok(ask("How many vacation days?", &["handbook.txt"])),
        )
        .await
        .unwrap();
        let (_, body) = body_json(res).await;
        assert_eq!(body["data"]["cached"], true);
    }

    #[tokio::test]
    async fn empty_query_is_400() {
        let state = state().await;
        let err = ask_question_route(State(state), HeaderMap::new(), Ok(ask("  ", &[])))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
