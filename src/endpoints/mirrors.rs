use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};

use crate::error::Result;
use crate::models::mirror;
use crate::services::inventory::{self, MirrorPatch, NewMirror};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/mirrors", get(list_mirrors))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/mirrors", post(create_mirror))
        .route("/mirrors/{name}", patch(update_mirror).delete(delete_mirror))
}

/// All mirrors, 204 when there are none
async fn list_mirrors(State(state): State<AppState>) -> Result<Response> {
    let mirrors = inventory::list_mirrors(&state.db).await?;

    if mirrors.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(mirrors).into_response())
}

async fn create_mirror(
    State(state): State<AppState>,
    Json(data): Json<NewMirror>,
) -> Result<(StatusCode, Json<mirror::Model>)> {
    let created = inventory::create_mirror(&state.db, state.resolver.as_ref(), data).await?;
    state.invalidate_cache();
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_mirror(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(data): Json<MirrorPatch>,
) -> Result<StatusCode> {
    inventory::patch_mirror(&state.db, &name, data).await?;
    state.invalidate_cache();
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_mirror(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    inventory::delete_mirror(&state.db, &name).await?;
    state.invalidate_cache();
    Ok(StatusCode::NO_CONTENT)
}
