//! Mirror and repo inventory management.
//!
//! Every mutation keeps the status table in step with the inventory: a
//! (mirror, repo) row exists while the mirror has the base directory for
//! the repo's architecture family.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{mirror, repo, status};
use crate::services::geo::{resolve_host, IpFamilies, Location, LocationResolver};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "has_basedir"))]
pub struct NewMirror {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub basedir: String,
    #[serde(default)]
    pub basedir_altarch: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn has_basedir(mirror: &NewMirror) -> std::result::Result<(), ValidationError> {
    if mirror.basedir.is_empty() && mirror.basedir_altarch.is_empty() {
        return Err(ValidationError::new("basedir_required"));
    }
    Ok(())
}

/// Fields an admin may change on a mirror
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorPatch {
    pub enabled: Option<bool>,
    pub basedir: Option<String>,
    pub basedir_altarch: Option<String>,
    pub http: Option<bool>,
    pub https: Option<bool>,
    pub rsync: Option<bool>,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(default)]
pub struct NewRepo {
    #[validate(range(min = 1))]
    pub release: i32,
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub arch: String,
    pub is_altarch: bool,
    pub enabled: bool,
}

impl Default for NewRepo {
    fn default() -> Self {
        Self {
            release: 0,
            path: String::new(),
            name: String::new(),
            arch: String::new(),
            is_altarch: false,
            enabled: true,
        }
    }
}

/// Fields an admin may change on a repo
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RepoPatch {
    pub enabled: Option<bool>,
    #[validate(range(min = 1))]
    pub release: Option<i32>,
    #[validate(length(min = 1))]
    pub path: Option<String>,
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub arch: Option<String>,
}

// ============================================================================
// Mirrors
// ============================================================================

pub async fn list_mirrors(db: &DatabaseConnection) -> Result<Vec<mirror::Model>> {
    Ok(Mirror::find()
        .order_by_asc(mirror::Column::Id)
        .all(db)
        .await?)
}

async fn find_mirror<C: ConnectionTrait>(db: &C, name: &str) -> Result<mirror::Model> {
    Mirror::find()
        .filter(mirror::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Mirror {} not found", name)))
}

fn mirror_exists(name: &str) -> AppError {
    AppError::Conflict(format!("Mirror {} already exists", name))
}

/// Add a mirror. IP families come from DNS and the location from the
/// first resolved address.
pub async fn create_mirror(
    db: &DatabaseConnection,
    resolver: &dyn LocationResolver,
    data: NewMirror,
) -> Result<mirror::Model> {
    data.validate().map_err(|_| {
        AppError::BadRequest("Required parameters: name, basedir and/or basedir_altarch".to_string())
    })?;

    let addrs = resolve_host(&data.name).await;
    let families = IpFamilies::of(&addrs);
    let location = addrs
        .first()
        .map(|ip| resolver.locate(*ip))
        .unwrap_or_else(Location::unknown);

    let txn = db.begin().await?;

    let existing = Mirror::find()
        .filter(mirror::Column::Name.eq(&data.name))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(mirror_exists(&data.name));
    }

    let name = data.name.clone();
    let created = mirror::ActiveModel {
        name: Set(data.name),
        basedir: Set(data.basedir),
        basedir_altarch: Set(data.basedir_altarch),
        http: Set(true),
        https: Set(true),
        rsync: Set(true),
        ipv4: Set(families.ipv4),
        ipv6: Set(families.ipv6),
        continent: Set(location.continent),
        country: Set(location.country),
        region: Set(location.region),
        latitude: Set(location.latitude),
        longitude: Set(location.longitude),
        enabled: Set(data.enabled),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| match e.sql_err() {
        // Lost a race against another create of the same name
        Some(SqlErr::UniqueConstraintViolation(_)) => mirror_exists(&name),
        _ => AppError::from(e),
    })?;

    let repos = Repo::find()
        .filter(repo::Column::Enabled.eq(true))
        .all(&txn)
        .await?;
    let repo_ids: Vec<i64> = repos
        .iter()
        .filter(|r| created.serves(r.is_altarch))
        .map(|r| r.id)
        .collect();
    insert_status_rows(&txn, repo_ids.iter().map(|&repo_id| (created.id, repo_id))).await?;

    txn.commit().await?;

    tracing::info!(
        mirror_id = created.id,
        "Added mirror {} ({} repos)",
        created.name,
        repo_ids.len()
    );
    Ok(created)
}

pub async fn patch_mirror(db: &DatabaseConnection, name: &str, patch: MirrorPatch) -> Result<()> {
    let txn = db.begin().await?;
    let existing = find_mirror(&txn, name).await?;

    let new_basedir = patch.basedir.clone().unwrap_or_else(|| existing.basedir.clone());
    let new_altarch = patch
        .basedir_altarch
        .clone()
        .unwrap_or_else(|| existing.basedir_altarch.clone());
    if new_basedir.is_empty() && new_altarch.is_empty() {
        return Err(AppError::BadRequest(
            "A mirror needs basedir and/or basedir_altarch".to_string(),
        ));
    }

    let mut active: mirror::ActiveModel = existing.clone().into();
    if let Some(enabled) = patch.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(basedir) = patch.basedir {
        active.basedir = Set(basedir);
    }
    if let Some(basedir_altarch) = patch.basedir_altarch {
        active.basedir_altarch = Set(basedir_altarch);
    }
    if let Some(http) = patch.http {
        active.http = Set(http);
    }
    if let Some(https) = patch.https {
        active.https = Set(https);
    }
    if let Some(rsync) = patch.rsync {
        active.rsync = Set(rsync);
    }
    if let Some(continent) = patch.continent {
        active.continent = Set(continent);
    }
    if let Some(country) = patch.country {
        active.country = Set(country);
    }
    if let Some(region) = patch.region {
        active.region = Set(region);
    }
    if let Some(latitude) = patch.latitude {
        active.latitude = Set(latitude);
    }
    if let Some(longitude) = patch.longitude {
        active.longitude = Set(longitude);
    }
    let updated = if active.is_changed() {
        active.update(&txn).await?
    } else {
        existing.clone()
    };

    for altarch in [false, true] {
        let before = existing.serves(altarch);
        let after = updated.serves(altarch);
        if before == after {
            continue;
        }

        let family: Vec<repo::Model> = Repo::find()
            .filter(repo::Column::IsAltarch.eq(altarch))
            .all(&txn)
            .await?;

        if before {
            let repo_ids: Vec<i64> = family.iter().map(|r| r.id).collect();
            if !repo_ids.is_empty() {
                Status::delete_many()
                    .filter(status::Column::MirrorId.eq(updated.id))
                    .filter(status::Column::RepoId.is_in(repo_ids))
                    .exec(&txn)
                    .await?;
            }
        } else {
            let present: Vec<i64> = Status::find()
                .filter(status::Column::MirrorId.eq(updated.id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|s| s.repo_id)
                .collect();
            let rows = family
                .iter()
                .filter(|r| r.enabled && !present.contains(&r.id))
                .map(|r| (updated.id, r.id));
            insert_status_rows(&txn, rows).await?;
        }
    }

    txn.commit().await?;

    tracing::info!(mirror_id = updated.id, "Updated mirror {}", updated.name);
    Ok(())
}

pub async fn delete_mirror(db: &DatabaseConnection, name: &str) -> Result<()> {
    let txn = db.begin().await?;
    let existing = find_mirror(&txn, name).await?;

    Status::delete_many()
        .filter(status::Column::MirrorId.eq(existing.id))
        .exec(&txn)
        .await?;
    Mirror::delete_by_id(existing.id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(mirror_id = existing.id, "Deleted mirror {}", existing.name);
    Ok(())
}

// ============================================================================
// Repos
// ============================================================================

pub async fn list_repos(db: &DatabaseConnection) -> Result<Vec<repo::Model>> {
    Ok(Repo::find().order_by_asc(repo::Column::Id).all(db).await?)
}

pub async fn create_repo(db: &DatabaseConnection, data: NewRepo) -> Result<repo::Model> {
    data.validate().map_err(|_| {
        AppError::BadRequest("Required parameters: release, path, name, arch".to_string())
    })?;

    let txn = db.begin().await?;

    let created = repo::ActiveModel {
        major_release: Set(data.release),
        path: Set(data.path),
        name: Set(data.name),
        arch: Set(data.arch),
        is_altarch: Set(data.is_altarch),
        enabled: Set(data.enabled),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mirrors = Mirror::find()
        .filter(mirror::Column::Enabled.eq(true))
        .all(&txn)
        .await?;
    let rows: Vec<(i64, i64)> = mirrors
        .iter()
        .filter(|m| m.serves(created.is_altarch))
        .map(|m| (m.id, created.id))
        .collect();
    let mirror_count = rows.len();
    insert_status_rows(&txn, rows).await?;

    txn.commit().await?;

    tracing::info!(
        repo_id = created.id,
        "Created repo {}/{}/{} ({} mirrors)",
        created.major_release,
        created.name,
        created.arch,
        mirror_count
    );
    Ok(created)
}

async fn find_repo<C: ConnectionTrait>(db: &C, id: i64) -> Result<repo::Model> {
    Repo::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Repo {} not found", id)))
}

pub async fn patch_repo(db: &DatabaseConnection, id: i64, patch: RepoPatch) -> Result<()> {
    patch.validate()?;

    let existing = find_repo(db, id).await?;
    let mut active: repo::ActiveModel = existing.into();
    if let Some(enabled) = patch.enabled {
        active.enabled = Set(enabled);
    }
    if let Some(release) = patch.release {
        active.major_release = Set(release);
    }
    if let Some(path) = patch.path {
        active.path = Set(path);
    }
    if let Some(name) = patch.name {
        active.name = Set(name);
    }
    if let Some(arch) = patch.arch {
        active.arch = Set(arch);
    }
    if active.is_changed() {
        active.update(db).await?;
    }

    tracing::info!(repo_id = id, "Updated repo");
    Ok(())
}

pub async fn delete_repo(db: &DatabaseConnection, id: i64) -> Result<()> {
    let txn = db.begin().await?;
    find_repo(&txn, id).await?;

    Status::delete_many()
        .filter(status::Column::RepoId.eq(id))
        .exec(&txn)
        .await?;
    Repo::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(repo_id = id, "Deleted repo");
    Ok(())
}

/// Insert never-checked status rows for (mirror_id, repo_id) pairs
async fn insert_status_rows<C, I>(db: &C, pairs: I) -> Result<()>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = (i64, i64)>,
{
    let rows: Vec<status::ActiveModel> = pairs
        .into_iter()
        .map(|(mirror_id, repo_id)| status::ActiveModel {
            mirror_id: Set(mirror_id),
            repo_id: Set(repo_id),
            timestamp: Set(0),
            checked: Set(0),
            result: Set(0),
        })
        .collect();

    if rows.is_empty() {
        return Ok(());
    }

    Status::insert_many(rows).exec_without_returning(db).await?;
    Ok(())
}
