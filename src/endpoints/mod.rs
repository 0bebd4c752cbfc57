pub mod cache;
pub mod issues;
pub mod location;
pub mod mirrorlist;
pub mod mirrors;
pub mod repos;

use axum::{routing::get, Router};

use crate::config::frontend::AdminConfig;
use crate::state::AppState;

/// Create the router. Admin endpoints are only registered when enabled.
pub fn create_router(state: AppState, admin: &AdminConfig) -> Router {
    let mut router = Router::new().route("/", get(mirrorlist::get_mirrorlist));

    let mut admin_routes = Router::new();
    if admin.read {
        tracing::info!("Enabling /admin read-only endpoints");
        admin_routes = admin_routes.merge(admin_read_routes());
    }
    if admin.write {
        tracing::info!("Enabling /admin writable endpoints");
        admin_routes = admin_routes.merge(admin_write_routes());
    }
    if admin.read || admin.write {
        router = router.nest("/admin", admin_routes);
    }

    router.with_state(state)
}

fn admin_read_routes() -> Router<AppState> {
    Router::new()
        .merge(location::location_routes())
        .merge(cache::read_routes())
        .merge(mirrors::read_routes())
        .merge(repos::read_routes())
        .merge(issues::issues_routes())
}

fn admin_write_routes() -> Router<AppState> {
    Router::new()
        .merge(cache::write_routes())
        .merge(mirrors::write_routes())
        .merge(repos::write_routes())
}
