//! Per-mirror summary of failed checks

use std::collections::BTreeMap;

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use serde::Serialize;

use crate::error::Result;
use crate::models::prelude::*;
use crate::models::{mirror, status};
use crate::services::checker::outcome::CheckOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorIssues {
    pub name: String,
    /// Failure category to number of affected repos
    pub errors: BTreeMap<String, i64>,
}

#[derive(Debug, FromQueryResult)]
struct FailureCount {
    name: String,
    result: i32,
    count: i64,
}

/// Mirrors whose last check of at least one repo did not succeed
pub async fn list_issues(db: &DatabaseConnection) -> Result<Vec<MirrorIssues>> {
    let rows = Status::find()
        .select_only()
        .column_as(mirror::Column::Name, "name")
        .column_as(status::Column::Result, "result")
        .column_as(status::Column::RepoId.count(), "count")
        .join(JoinType::InnerJoin, status::Relation::Mirror.def())
        .filter(status::Column::Result.ne(200))
        .filter(status::Column::Checked.gt(0))
        .group_by(mirror::Column::Name)
        .group_by(status::Column::Result)
        .order_by_asc(mirror::Column::Name)
        .into_model::<FailureCount>()
        .all(db)
        .await?;

    let mut issues: Vec<MirrorIssues> = Vec::new();
    for row in rows {
        let category = CheckOutcome::from_code(row.result).description();
        match issues.last_mut() {
            Some(last) if last.name == row.name => {
                *last.errors.entry(category).or_default() += row.count;
            }
            _ => issues.push(MirrorIssues {
                name: row.name,
                errors: BTreeMap::from([(category, row.count)]),
            }),
        }
    }

    Ok(issues)
}
