use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{header, Extensions, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;

use crate::services::geo::ClientAddr;
use crate::services::selection::SelectionError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MirrorlistQuery {
    pub arch: Option<String>,
    pub release: Option<String>,
    pub repo: Option<String>,
    /// Client address override
    pub ip: Option<String>,
}

fn param<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Mirror list for a release/repo/arch as plain text, one URL per line
pub async fn get_mirrorlist(
    State(state): State<AppState>,
    extensions: Extensions,
    Query(query): Query<MirrorlistQuery>,
) -> Response {
    let start = Instant::now();

    let client = match param(&query.ip) {
        Some(ip) => ClientAddr::parse(ip),
        None => extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| ClientAddr::Parsed(info.0.ip()))
            .unwrap_or(ClientAddr::Unparsable),
    };

    let (Some(arch), Some(release), Some(repo)) = (
        param(&query.arch),
        param(&query.release),
        param(&query.repo),
    ) else {
        let missing = [("arch", &query.arch), ("release", &query.release), ("repo", &query.repo)]
            .into_iter()
            .find(|(_, value)| param(value).is_none())
            .map(|(key, _)| key)
            .unwrap_or("arch");
        return text_response(
            &state,
            StatusCode::BAD_REQUEST,
            Bytes::from(format!("{} not specified\n", missing)),
        );
    };

    match state.selector.select(release, repo, arch, client).await {
        Ok(selection) => {
            let mut response = text_response(&state, StatusCode::OK, selection.body);
            let headers = response.headers_mut();
            if state.cache.is_some() {
                headers.insert(
                    "X-Cache-Hit",
                    HeaderValue::from_static(if selection.cache_hit { "true" } else { "false" }),
                );
            }
            if let Ok(elapsed) = HeaderValue::from_str(&format!("{:?}", start.elapsed())) {
                headers.insert("X-Processing-Time", elapsed);
            }
            response
        }
        Err(SelectionError::UnknownRepo) => text_response(
            &state,
            StatusCode::NOT_FOUND,
            Bytes::from_static(b"Invalid release/repo/arch combination\n"),
        ),
        Err(SelectionError::NoMirrors(_)) => {
            text_response(&state, StatusCode::NOT_FOUND, Bytes::new())
        }
        Err(SelectionError::Store(e)) => {
            tracing::error!("Repo lookup failed: {}", e);
            text_response(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(b"Internal server error\n"),
            )
        }
    }
}

/// Plain text response carrying the configured static headers
fn text_response(state: &AppState, status: StatusCode, body: Bytes) -> Response {
    let mut response = (status, Body::from(body)).into_response();
    let headers = response.headers_mut();
    for (name, value) in state.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
