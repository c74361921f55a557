use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use contextor::{Settings, SettingsUpdate};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

/// `GET /settings`
pub async fn get_settings_route(State(state): State<Arc<AppState>>) -> ApiResponse<Settings> {
    ApiResponse::ok(state.contextor.settings())
}

/// `PUT /settings`: partial update. Chunking changes apply to the next
/// ingestion; any accepted change clears the response cache.
pub async fn update_settings_route(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> AppResult<ApiResponse<Settings>> {
    let Json(update) = payload?;
    let settings = state.contextor.update_settings(&update)?;
    Ok(ApiResponse::ok(settings))
}
