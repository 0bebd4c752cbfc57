use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::services::geo::{ClientAddr, Location};
use crate::state::AppState;

pub fn location_routes() -> Router<AppState> {
    Router::new().route("/location", get(get_location))
}

/// Resolve an address the way client lookups do
async fn get_location(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Location>> {
    let ip = params
        .get("ip")
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| AppError::BadRequest("Parameter \"ip\" not set".to_string()))?;

    Ok(Json(ClientAddr::parse(ip).locate(state.resolver.as_ref())))
}
