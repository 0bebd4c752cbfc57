//! Mirror selection for client lookups.
//!
//! A lookup resolves the requested repo, checks the response cache, and on
//! a miss ranks the repo's mirrors by freshness and geographic proximity to
//! the client before rendering them as a newline-separated URL list.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, JoinType, Order,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait,
};
use thiserror::Error;

use crate::db::random_function;
use crate::models::prelude::*;
use crate::models::{mirror, repo, status};
use crate::services::cache::ResponseCache;
use crate::services::geo::{ClientAddr, IpVersion, Location, LocationResolver};

static DUPLICATE_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum SelectionError {
    /// No enabled repo matches the release/repo/arch combination
    #[error("Invalid release/repo/arch combination")]
    UnknownRepo,

    /// The repo exists but no enabled mirror carries it
    #[error("No mirrors for repo {0}")]
    NoMirrors(i64),

    #[error("Database error: {0}")]
    Store(#[from] DbErr),
}

/// Rendered mirror list
#[derive(Debug, Clone)]
pub struct Selection {
    pub body: Bytes,
    pub cache_hit: bool,
}

/// Selects and renders mirrors for a repo
pub struct MirrorSelector {
    db: DatabaseConnection,
    cache: Option<Arc<ResponseCache>>,
    resolver: Arc<dyn LocationResolver>,
    list_size: usize,
    ttl: Duration,
}

impl MirrorSelector {
    pub fn new(
        db: DatabaseConnection,
        cache: Option<Arc<ResponseCache>>,
        resolver: Arc<dyn LocationResolver>,
        list_size: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            db,
            cache,
            resolver,
            list_size,
            ttl,
        }
    }

    /// Produce the mirror list for `release`/`repo`/`arch` as seen from `client`
    pub async fn select(
        &self,
        release: &str,
        repo_name: &str,
        arch: &str,
        client: ClientAddr,
    ) -> Result<Selection, SelectionError> {
        let repo = self
            .find_repo(release, repo_name, arch)
            .await?
            .ok_or(SelectionError::UnknownRepo)?;

        let version = client.version();
        let location = client.locate(self.resolver.as_ref());
        let key = cache_key(repo.id, version, &location);

        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(&key) {
                return Ok(Selection {
                    body,
                    cache_hit: true,
                });
            }
        }

        let candidates = match self.candidates(repo.id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(repo_id = repo.id, "Failed to load mirrors: {}", e);
                Vec::new()
            }
        };
        if candidates.is_empty() {
            tracing::info!(repo_id = repo.id, "Found no mirrors for repo");
            return Err(SelectionError::NoMirrors(repo.id));
        }

        let selected = if candidates.len() <= self.list_size {
            candidates
        } else if location.known {
            rank_by_proximity(candidates, &location, version, self.list_size)
        } else {
            let mut candidates = candidates;
            candidates.truncate(self.list_size);
            candidates
        };

        if selected.len() < self.list_size {
            tracing::debug!(
                repo_id = repo.id,
                "Client has only {} mirror(s) available",
                selected.len()
            );
        }

        let body = Bytes::from(render_mirror_urls(&selected, &repo));

        if let Some(cache) = &self.cache {
            if !body.is_empty() && !cache.set(&key, body.clone(), self.ttl) {
                tracing::warn!("Response for {} too large to cache", key);
            }
        }

        Ok(Selection {
            body,
            cache_hit: false,
        })
    }

    /// Enabled repo for the combination. A non-numeric release never matches.
    async fn find_repo(
        &self,
        release: &str,
        name: &str,
        arch: &str,
    ) -> Result<Option<repo::Model>, DbErr> {
        let Ok(release) = release.trim().parse::<i32>() else {
            return Ok(None);
        };

        Repo::find()
            .filter(repo::Column::Enabled.eq(true))
            .filter(repo::Column::MajorRelease.eq(release))
            .filter(repo::Column::Name.eq(name))
            .filter(repo::Column::Arch.eq(arch))
            .one(&self.db)
            .await
    }

    /// Enabled mirrors carrying the repo, freshest first, ties broken randomly
    async fn candidates(&self, repo_id: i64) -> Result<Vec<mirror::Model>, DbErr> {
        let backend = self.db.get_database_backend();

        Mirror::find()
            .join(JoinType::InnerJoin, mirror::Relation::Status.def())
            .filter(status::Column::RepoId.eq(repo_id))
            .filter(mirror::Column::Enabled.eq(true))
            .order_by_desc(status::Column::Timestamp)
            .order_by(Expr::cust(random_function(backend)), Order::Asc)
            .all(&self.db)
            .await
    }
}

/// Key of a cached response: repo, IP version and client location
pub fn cache_key(repo_id: i64, version: IpVersion, location: &Location) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        repo_id, version, location.continent, location.country, location.region
    )
}

/// Proximity tier of a mirror for a client, lower is closer.
///
/// 1 = same region, 2 = same country, 3 = same continent. Mirrors that are
/// disabled, lack the client's IP version, or are on another continent
/// have no tier.
pub fn proximity_tier(mirror: &mirror::Model, location: &Location, version: IpVersion) -> Option<u8> {
    let reachable = match version {
        IpVersion::V4 => mirror.ipv4,
        IpVersion::V6 => mirror.ipv6,
    };
    if !mirror.enabled || !reachable {
        return None;
    }

    let same = |client: &str, mirror: &str| !client.is_empty() && client == mirror;

    if !same(&location.continent, &mirror.continent) {
        return None;
    }
    if !same(&location.country, &mirror.country) {
        return Some(3);
    }
    if !same(&location.region, &mirror.region) {
        return Some(2);
    }
    Some(1)
}

/// Keep the `limit` closest mirrors, random order within a tier. Mirrors
/// without a tier are dropped, so fewer than `limit` may be returned.
pub fn rank_by_proximity(
    candidates: Vec<mirror::Model>,
    location: &Location,
    version: IpVersion,
    limit: usize,
) -> Vec<mirror::Model> {
    let mut ranked: Vec<(u8, mirror::Model)> = candidates
        .into_iter()
        .filter_map(|m| proximity_tier(&m, location, version).map(|tier| (tier, m)))
        .collect();

    ranked.shuffle(&mut rand::rng());
    ranked.sort_by_key(|(tier, _)| *tier);

    ranked.into_iter().take(limit).map(|(_, m)| m).collect()
}

/// `http://<host>/<basedir>/<subpath>` with duplicate slashes collapsed
pub fn mirror_url(host: &str, basedir: &str, subpath: &str) -> String {
    let path = format!("/{}/{}", basedir, subpath);
    format!("http://{}{}", host, DUPLICATE_SLASHES.replace_all(&path, "/"))
}

/// One URL per line in selection order. Mirrors without the base
/// directory for the repo's architecture family are skipped.
pub fn render_mirror_urls(mirrors: &[mirror::Model], repo: &repo::Model) -> String {
    let subpath = repo.subpath();

    mirrors
        .iter()
        .filter(|m| m.serves(repo.is_altarch))
        .map(|m| {
            let url = mirror_url(&m.name, m.basedir_for(repo.is_altarch), &subpath);
            format!("{}/\n", url.trim_end_matches('/'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(id: i64, continent: &str, country: &str, region: &str) -> mirror::Model {
        mirror::Model {
            id,
            name: format!("mirror{}.example.org", id),
            basedir: "/centos".to_string(),
            basedir_altarch: String::new(),
            http: true,
            https: true,
            rsync: false,
            ipv4: true,
            ipv6: false,
            continent: continent.to_string(),
            country: country.to_string(),
            region: region.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            enabled: true,
        }
    }

    fn repo(release: i32, path: &str, name: &str, arch: &str, altarch: bool) -> repo::Model {
        repo::Model {
            id: 1,
            major_release: release,
            path: path.to_string(),
            name: name.to_string(),
            arch: arch.to_string(),
            is_altarch: altarch,
            enabled: true,
        }
    }

    fn client(continent: &str, country: &str, region: &str) -> Location {
        Location {
            known: true,
            continent: continent.to_string(),
            country: country.to_string(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_proximity_tiers() {
        let loc = client("EU", "DE", "BE");
        assert_eq!(proximity_tier(&mirror(1, "EU", "DE", "BE"), &loc, IpVersion::V4), Some(1));
        assert_eq!(proximity_tier(&mirror(2, "EU", "DE", "BY"), &loc, IpVersion::V4), Some(2));
        assert_eq!(proximity_tier(&mirror(3, "EU", "FR", "IDF"), &loc, IpVersion::V4), Some(3));
        assert_eq!(proximity_tier(&mirror(4, "NA", "US", "CA"), &loc, IpVersion::V4), None);
    }

    #[test]
    fn test_tier_requires_ip_version() {
        let loc = client("EU", "DE", "BE");
        assert_eq!(proximity_tier(&mirror(1, "EU", "DE", "BE"), &loc, IpVersion::V6), None);
    }

    #[test]
    fn test_empty_client_fields_never_match() {
        let loc = client("EU", "", "");
        assert_eq!(proximity_tier(&mirror(1, "EU", "", ""), &loc, IpVersion::V4), Some(3));

        let nowhere = client("", "", "");
        assert_eq!(proximity_tier(&mirror(1, "", "", ""), &nowhere, IpVersion::V4), None);
    }

    #[test]
    fn test_rank_puts_closer_tiers_first() {
        let loc = client("EU", "DE", "BE");
        let candidates = vec![
            mirror(1, "EU", "FR", "IDF"),
            mirror(2, "EU", "DE", "BY"),
            mirror(3, "NA", "US", "CA"),
            mirror(4, "EU", "DE", "BE"),
            mirror(5, "EU", "DE", "BE"),
        ];

        for _ in 0..20 {
            let ranked = rank_by_proximity(candidates.clone(), &loc, IpVersion::V4, 4);
            let ids: Vec<i64> = ranked.iter().map(|m| m.id).collect();
            assert_eq!(ids.len(), 4);
            assert!(ids[..2].contains(&4) && ids[..2].contains(&5));
            assert_eq!(ids[2], 2);
            assert_eq!(ids[3], 1);
        }
    }

    #[test]
    fn test_rank_does_not_backfill() {
        let loc = client("EU", "DE", "BE");
        let candidates = vec![
            mirror(1, "EU", "DE", "BE"),
            mirror(2, "NA", "US", "CA"),
            mirror(3, "AS", "JP", "13"),
        ];
        let ranked = rank_by_proximity(candidates, &loc, IpVersion::V4, 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 1);
    }

    #[test]
    fn test_render_release_8_adds_os() {
        let out = render_mirror_urls(
            &[mirror(1, "EU", "DE", "BE")],
            &repo(8, "8", "BaseOS", "x86_64", false),
        );
        assert_eq!(out, "http://mirror1.example.org/centos/8/BaseOS/x86_64/os/\n");
    }

    #[test]
    fn test_render_os_level_only_for_release_8() {
        let m = [mirror(1, "EU", "DE", "BE")];
        assert_eq!(
            render_mirror_urls(&m, &repo(7, "7", "os", "x86_64", false)),
            "http://mirror1.example.org/centos/7/os/x86_64/\n"
        );
        assert_eq!(
            render_mirror_urls(&m, &repo(8, "8", "isos", "x86_64", false)),
            "http://mirror1.example.org/centos/8/isos/x86_64/os/\n"
        );
        assert_eq!(
            render_mirror_urls(&m, &repo(9, "9-stream", "isos", "x86_64", false)),
            "http://mirror1.example.org/centos/9-stream/isos/x86_64/\n"
        );
    }

    #[test]
    fn test_render_collapses_slashes_and_keeps_order() {
        let mut a = mirror(2, "EU", "DE", "BE");
        a.basedir = "/pub//centos/".to_string();
        let b = mirror(1, "EU", "DE", "BE");

        let out = render_mirror_urls(&[a, b], &repo(7, "/7/", "updates", "x86_64", false));
        assert_eq!(
            out,
            "http://mirror2.example.org/pub/centos/7/updates/x86_64/\n\
             http://mirror1.example.org/centos/7/updates/x86_64/\n"
        );
    }

    #[test]
    fn test_render_altarch_skips_mirrors_without_basedir() {
        let mut alt = mirror(1, "EU", "DE", "BE");
        alt.basedir_altarch = "altarch".to_string();
        let plain = mirror(2, "EU", "DE", "BE");

        let out = render_mirror_urls(&[plain, alt], &repo(7, "7", "os", "aarch64", true));
        assert_eq!(out, "http://mirror1.example.org/altarch/7/os/aarch64/\n");
    }

    #[test]
    fn test_cache_key_includes_location_and_version() {
        let loc = client("EU", "DE", "BE");
        assert_eq!(cache_key(7, IpVersion::V4, &loc), "7|4|EU|DE|BE");
        assert_eq!(cache_key(7, IpVersion::V6, &Location::unknown()), "7|6|||");
    }
}
