use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::error::Result;
use crate::services::issues;
use crate::state::AppState;

pub fn issues_routes() -> Router<AppState> {
    Router::new().route("/issues", get(list_issues))
}

/// Mirrors with failed checks, grouped by failure category
async fn list_issues(State(state): State<AppState>) -> Result<Response> {
    let issues = issues::list_issues(&state.db).await?;

    if issues.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(issues).into_response())
}
