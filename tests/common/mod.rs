//! Test helpers and utilities for integration testing.
//!
//! Provides an in-memory store with the schema applied, a fixed-table
//! location resolver, and inventory builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use mirrorlist::config::frontend::FrontendConfig;
use mirrorlist::endpoints::create_router;
use mirrorlist::migrations::Migrator;
use mirrorlist::models::{mirror, repo, status};
use mirrorlist::services::geo::{Location, LocationResolver};
use mirrorlist::state::AppState;

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Resolver backed by a fixed address table
#[derive(Default)]
pub struct StaticResolver {
    locations: HashMap<IpAddr, Location>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: &str, continent: &str, country: &str, region: &str) -> Self {
        self.locations.insert(
            ip.parse().expect("valid test address"),
            location(continent, country, region),
        );
        self
    }
}

impl LocationResolver for StaticResolver {
    fn locate(&self, ip: IpAddr) -> Location {
        self.locations
            .get(&ip)
            .cloned()
            .unwrap_or_else(Location::unknown)
    }
}

pub fn location(continent: &str, country: &str, region: &str) -> Location {
    Location {
        known: true,
        continent: continent.to_string(),
        country: country.to_string(),
        region: region.to_string(),
        ..Location::unknown()
    }
}

/// Insert an enabled, dual-stack mirror
pub async fn insert_mirror(
    db: &DatabaseConnection,
    name: &str,
    basedir: &str,
    basedir_altarch: &str,
    place: (&str, &str, &str),
) -> mirror::Model {
    mirror::ActiveModel {
        name: Set(name.to_string()),
        basedir: Set(basedir.to_string()),
        basedir_altarch: Set(basedir_altarch.to_string()),
        http: Set(true),
        https: Set(true),
        rsync: Set(true),
        ipv4: Set(true),
        ipv6: Set(true),
        continent: Set(place.0.to_string()),
        country: Set(place.1.to_string()),
        region: Set(place.2.to_string()),
        latitude: Set(0.0),
        longitude: Set(0.0),
        enabled: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert mirror")
}

/// Insert an enabled repo
pub async fn insert_repo(
    db: &DatabaseConnection,
    release: i32,
    path: &str,
    name: &str,
    arch: &str,
    is_altarch: bool,
) -> repo::Model {
    repo::ActiveModel {
        major_release: Set(release),
        path: Set(path.to_string()),
        name: Set(name.to_string()),
        arch: Set(arch.to_string()),
        is_altarch: Set(is_altarch),
        enabled: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert repo")
}

pub async fn insert_status(
    db: &DatabaseConnection,
    mirror_id: i64,
    repo_id: i64,
    timestamp: i64,
    checked: i64,
    result: i32,
) -> status::Model {
    status::ActiveModel {
        mirror_id: Set(mirror_id),
        repo_id: Set(repo_id),
        timestamp: Set(timestamp),
        checked: Set(checked),
        result: Set(result),
    }
    .insert(db)
    .await
    .expect("Failed to insert status")
}

/// Frontend settings with both admin surfaces enabled
pub fn admin_frontend() -> FrontendConfig {
    let mut frontend = FrontendConfig::default();
    frontend.admin.read = true;
    frontend.admin.write = true;
    frontend
}

pub fn build_app_state(
    db: DatabaseConnection,
    resolver: StaticResolver,
    frontend: &FrontendConfig,
) -> AppState {
    AppState::new(db, Arc::new(resolver), frontend)
}

/// Router plus the state behind it, so tests can inspect the cache
pub fn build_app(
    db: DatabaseConnection,
    resolver: StaticResolver,
    frontend: &FrontendConfig,
) -> (Router, AppState) {
    let state = build_app_state(db, resolver, frontend);
    (create_router(state.clone(), &frontend.admin), state)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("DELETE")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
