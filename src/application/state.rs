use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::frontend::FrontendConfig;
use crate::db::DbConn;
use crate::services::cache::ResponseCache;
use crate::services::geo::LocationResolver;
use crate::services::selection::MirrorSelector;

/// Application state shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub selector: Arc<MirrorSelector>,
    /// `None` when caching is disabled
    pub cache: Option<Arc<ResponseCache>>,
    pub resolver: Arc<dyn LocationResolver>,
    /// Headers added to every mirror list response
    pub headers: Arc<HeaderMap>,
}

impl AppState {
    pub fn new(db: DbConn, resolver: Arc<dyn LocationResolver>, frontend: &FrontendConfig) -> Self {
        let cache = frontend
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::new(frontend.cache.size)));

        let selector = MirrorSelector::new(
            db.clone(),
            cache.clone(),
            resolver.clone(),
            frontend.results,
            frontend.cache.ttl(),
        );

        Self {
            db,
            selector: Arc::new(selector),
            cache,
            resolver,
            headers: Arc::new(static_headers(frontend)),
        }
    }

    /// Drop all cached responses, if caching is enabled
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

/// Build the configured response headers, skipping invalid ones
fn static_headers(frontend: &FrontendConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in frontend.static_headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(header), Ok(header_value)) => {
                tracing::info!("Setting header \"{}\" to \"{}\"", name, value);
                headers.insert(header, header_value);
            }
            _ => tracing::warn!("Skipping invalid header \"{}\": \"{}\"", name, value),
        }
    }

    headers
}
