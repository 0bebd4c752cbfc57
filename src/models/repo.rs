use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repos")]
pub struct Model {
    #[sea_orm(primary_key, column_name = "repo_id")]
    pub id: i64,
    #[serde(rename = "release")]
    pub major_release: i32,
    pub path: String,
    pub name: String,
    pub arch: String,
    pub is_altarch: bool,
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::status::Entity")]
    Status,
}

impl Related<super::status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Status.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Path below a mirror's base directory
    pub fn subpath(&self) -> String {
        repo_subpath(self.major_release, &self.path, &self.name, &self.arch)
    }
}

pub fn is_iso_repo(name: &str) -> bool {
    name.contains("isos")
}

/// `<path>/<name>/<arch>`, with an extra `os` level for release 8 repos
pub fn repo_subpath(major_release: i32, path: &str, name: &str, arch: &str) -> String {
    if major_release == 8 {
        format!("{}/{}/{}/os", path, name, arch)
    } else {
        format!("{}/{}/{}", path, name, arch)
    }
}

/// Directory holding the files a freshness check fetches. Release 8 ISO
/// repos keep their checksum files directly under `<arch>`.
pub fn check_subpath(major_release: i32, path: &str, name: &str, arch: &str) -> String {
    if is_iso_repo(name) {
        format!("{}/{}/{}", path, name, arch)
    } else {
        repo_subpath(major_release, path, name, arch)
    }
}
