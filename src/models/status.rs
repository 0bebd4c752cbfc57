use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "status")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub mirror_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub repo_id: i64,
    /// Upstream content timestamp from the last successful check
    pub timestamp: i64,
    /// When the pair was last probed, 0 if never
    pub checked: i64,
    pub result: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::mirror::Entity",
        from = "Column::MirrorId",
        to = "super::mirror::Column::Id",
        on_delete = "Cascade"
    )]
    Mirror,
    #[sea_orm(
        belongs_to = "super::repo::Entity",
        from = "Column::RepoId",
        to = "super::repo::Column::Id",
        on_delete = "Cascade"
    )]
    Repo,
}

impl Related<super::mirror::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mirror.def()
    }
}

impl Related<super::repo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
