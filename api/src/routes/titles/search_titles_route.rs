use std::sync::Arc;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
};

use rag_store::TitleMatch;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::titles::search_titles_request::SearchTitlesRequest,
};

/// `GET /titles?q=`: distinct `(title, source_id)` pairs of completed documents.
pub async fn search_titles_route(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchTitlesRequest>, QueryRejection>,
) -> AppResult<ApiResponse<Vec<TitleMatch>>> {
    let Query(p) = query?;
    let matches = state.contextor.search_titles(&p.q).await?;
    Ok(ApiResponse::ok(matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{body_json, seed, state};

    #[tokio::test]
    async fn matches_titles_case_insensitively() {
        let state = state().await;
        seed(&state, "hb.txt", "Employee Handbook\n\nBody.").await;
        seed(&state, "menu.txt", "Cafeteria Menu\n\nSoup.").await;

        let res = search_titles_route(
            State(state.clone()),
            Ok(Query(SearchTitlesRequest { q: "  handBOOK ".into() })),
        )
        .await
        .unwrap();
        let (_, body) = body_json(res).await;
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Employee Handbook");
        assert_eq!(rows[0]["source_id"], "hb.txt");

        let res = search_titles_route(State(state), Ok(Query(SearchTitlesRequest::default())))
            .await
            .unwrap();
        let (_, body) = body_json(res).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    }
}
