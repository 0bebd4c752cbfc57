use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::services::cache::{CacheStats, ResponseCache};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/cache", get(get_cache_stats))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/cache", delete(clear_cache))
}

fn enabled_cache(state: &AppState) -> Result<&ResponseCache> {
    state
        .cache
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Caching is disabled".to_string()))
}

/// Cache counters
async fn get_cache_stats(State(state): State<AppState>) -> Result<Json<CacheStats>> {
    Ok(Json(enabled_cache(&state)?.stats()))
}

/// Drop all cached responses
async fn clear_cache(State(state): State<AppState>) -> Result<StatusCode> {
    enabled_cache(&state)?.clear();
    tracing::info!("Cache cleared");
    Ok(StatusCode::NO_CONTENT)
}
