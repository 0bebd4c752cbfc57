use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mirrors")]
pub struct Model {
    #[sea_orm(primary_key, column_name = "mirror_id")]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub basedir: String,
    pub basedir_altarch: String,
    pub http: bool,
    pub https: bool,
    pub rsync: bool,
    pub ipv4: bool,
    pub ipv6: bool,
    pub continent: String,
    pub country: String,
    pub region: String,
    #[sea_orm(column_type = "Double")]
    pub latitude: f64,
    #[sea_orm(column_type = "Double")]
    pub longitude: f64,
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
    /// Base directory serving repos of the given architecture family
    pub fn basedir_for(&self, altarch: bool) -> &str {
        if altarch {
            &self.basedir_altarch
        } else {
            &self.basedir
        }
    }

    /// Whether the mirror carries repos of the given architecture family
    pub fn serves(&self, altarch: bool) -> bool {
        !self.basedir_for(altarch).is_empty()
    }
}
