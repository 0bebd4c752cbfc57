use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};

use crate::error::Result;
use crate::models::repo;
use crate::services::inventory::{self, NewRepo, RepoPatch};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/repos", get(list_repos))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/repos", post(create_repo))
        .route("/repos/{id}", patch(update_repo).delete(delete_repo))
}

/// All repos, 204 when there are none
async fn list_repos(State(state): State<AppState>) -> Result<Response> {
    let repos = inventory::list_repos(&state.db).await?;

    if repos.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(repos).into_response())
}

async fn create_repo(
    State(state): State<AppState>,
    Json(data): Json<NewRepo>,
) -> Result<(StatusCode, Json<repo::Model>)> {
    let created = inventory::create_repo(&state.db, data).await?;
    state.invalidate_cache();
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(data): Json<RepoPatch>,
) -> Result<StatusCode> {
    inventory::patch_repo(&state.db, id, data).await?;
    state.invalidate_cache();
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_repo(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    inventory::delete_repo(&state.db, id).await?;
    state.invalidate_cache();
    Ok(StatusCode::NO_CONTENT)
}
