//! Periodic task runner and the scheduling stage of the checker
//!
//! Pipeline stages that work on a fixed tick implement `PeriodicTask`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::{CheckTask, OutstandingChecks};
use crate::models::prelude::*;
use crate::models::repo::{check_subpath, is_iso_repo};
use crate::models::{mirror, repo, status};
use crate::services::selection::mirror_url;

/// Trait for periodic background tasks
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    /// How often to run
    fn interval(&self) -> Duration;

    /// Execute the task
    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()>;
}

/// Run a single task on its interval until the runtime shuts down
pub async fn run_task(task: Box<dyn PeriodicTask>, db: Arc<DatabaseConnection>) {
    let mut ticker = interval(task.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        tracing::trace!(task = task.name(), "Running periodic task");

        if let Err(e) = task.run(&db).await {
            tracing::error!(task = task.name(), error = %e, "Periodic task failed");
        }
    }
}

// ============================================================================
// Check scheduling
// ============================================================================

/// Upper bound (exclusive) of the random rescan offset in seconds
const MAX_JITTER_SECS: i64 = 60;

/// Fills the task queue with the stalest (mirror, repo) pairs, but only
/// once the previous batch has been fully taken by the dispatcher.
///
/// Pairs stay in `outstanding` from the moment they are queued until the
/// committer has written their result, and are never queued twice.
pub struct ScheduleChecksTask {
    pub tasks: mpsc::Sender<CheckTask>,
    pub batch_size: usize,
    pub rescan_interval: i64,
    pub tick: Duration,
    pub outstanding: OutstandingChecks,
}

#[async_trait]
impl PeriodicTask for ScheduleChecksTask {
    fn name(&self) -> &'static str {
        "schedule_checks"
    }

    fn interval(&self) -> Duration {
        self.tick
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()> {
        if self.tasks.capacity() != self.tasks.max_capacity() {
            return Ok(());
        }

        let jitter = rand::rng().random_range(0..MAX_JITTER_SECS);
        let now = chrono::Utc::now().timestamp();
        let tasks = find_next_check(
            db,
            self.batch_size as u64,
            self.rescan_interval + jitter,
            now,
            &self.outstanding.snapshot(),
        )
        .await?;

        if !tasks.is_empty() {
            tracing::debug!("Scheduling {} checks", tasks.len());
        }
        for task in tasks {
            let (mirror_id, repo_id) = (task.mirror_id, task.repo_id);
            if !self.outstanding.insert(mirror_id, repo_id) {
                continue;
            }
            if let Err(e) = self.tasks.send(task).await {
                self.outstanding.release(mirror_id, repo_id);
                return Err(e.into());
            }
        }

        Ok(())
    }
}

#[derive(Debug, FromQueryResult)]
struct StaleCheck {
    mirror_id: i64,
    repo_id: i64,
    mirror_name: String,
    basedir: String,
    basedir_altarch: String,
    major_release: i32,
    repo_path: String,
    repo_name: String,
    repo_arch: String,
    is_altarch: bool,
}

impl StaleCheck {
    fn into_task(self) -> CheckTask {
        let basedir = if self.is_altarch {
            &self.basedir_altarch
        } else {
            &self.basedir
        };
        let subpath = check_subpath(
            self.major_release,
            &self.repo_path,
            &self.repo_name,
            &self.repo_arch,
        );

        CheckTask {
            mirror_id: self.mirror_id,
            repo_id: self.repo_id,
            url: mirror_url(&self.mirror_name, basedir, &subpath),
            iso: is_iso_repo(&self.repo_name),
            altarch: self.is_altarch,
            valid: !basedir.is_empty(),
        }
    }
}

/// Up to `limit` pairs of enabled repos last checked more than `max_age`
/// seconds before `now`, stalest first. Pairs in `skip` are left out.
pub async fn find_next_check(
    db: &DatabaseConnection,
    limit: u64,
    max_age: i64,
    now: i64,
    skip: &HashSet<(i64, i64)>,
) -> Result<Vec<CheckTask>, DbErr> {
    let rows = Status::find()
        .select_only()
        .column(status::Column::MirrorId)
        .column(status::Column::RepoId)
        .column_as(mirror::Column::Name, "mirror_name")
        .column(mirror::Column::Basedir)
        .column(mirror::Column::BasedirAltarch)
        .column(repo::Column::MajorRelease)
        .column_as(repo::Column::Path, "repo_path")
        .column_as(repo::Column::Name, "repo_name")
        .column_as(repo::Column::Arch, "repo_arch")
        .column(repo::Column::IsAltarch)
        .join(JoinType::InnerJoin, status::Relation::Mirror.def())
        .join(JoinType::InnerJoin, status::Relation::Repo.def())
        .filter(status::Column::Checked.lt(now - max_age))
        .filter(repo::Column::Enabled.eq(true))
        .order_by_asc(status::Column::Checked)
        .limit(limit + skip.len() as u64)
        .into_model::<StaleCheck>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|row| !skip.contains(&(row.mirror_id, row.repo_id)))
        .take(limit as usize)
        .map(StaleCheck::into_task)
        .collect())
}
