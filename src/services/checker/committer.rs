//! Committing stage: batches probe results into one transaction.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use tokio::sync::{mpsc, Mutex};

use super::scheduler::PeriodicTask;
use super::{CheckResult, OutstandingChecks};
use crate::models::prelude::*;
use crate::models::status;

/// Writes results once enough are pending, or once the oldest pending
/// result has waited for `linger`.
pub struct CommitResultsTask {
    results: Mutex<mpsc::Receiver<CheckResult>>,
    outstanding: OutstandingChecks,
    pending_since: Mutex<Option<Instant>>,
    threshold: usize,
    linger: Duration,
    tick: Duration,
}

impl CommitResultsTask {
    /// `queue_capacity` is the capacity of the result queue. A batch is
    /// written once half of it is filled.
    pub fn new(
        results: mpsc::Receiver<CheckResult>,
        outstanding: OutstandingChecks,
        queue_capacity: usize,
        linger: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            results: Mutex::new(results),
            outstanding,
            pending_since: Mutex::new(None),
            threshold: (queue_capacity / 2).max(1),
            linger,
            tick,
        }
    }

    /// Take the results queued right now without waiting for more
    async fn drain(&self) -> Vec<CheckResult> {
        let mut results = self.results.lock().await;
        let pending = results.len();
        let mut batch = Vec::with_capacity(pending);
        while batch.len() < pending {
            match results.try_recv() {
                Ok(result) => batch.push(result),
                Err(_) => break,
            }
        }
        batch
    }

    async fn ready(&self) -> bool {
        let pending = self.results.lock().await.len();
        let mut since = self.pending_since.lock().await;

        if pending == 0 {
            *since = None;
            return false;
        }

        let first_seen = *since.get_or_insert_with(Instant::now);
        pending >= self.threshold || first_seen.elapsed() >= self.linger
    }
}

#[async_trait]
impl PeriodicTask for CommitResultsTask {
    fn name(&self) -> &'static str {
        "commit_results"
    }

    fn interval(&self) -> Duration {
        self.tick
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()> {
        if !self.ready().await {
            return Ok(());
        }

        let batch = self.drain().await;
        *self.pending_since.lock().await = None;
        if batch.is_empty() {
            return Ok(());
        }

        let committed = commit_results(db, &batch, chrono::Utc::now().timestamp()).await;

        // Pairs become schedulable again once `checked` is written, or
        // right away when the write failed
        for result in &batch {
            self.outstanding.release(result.mirror_id, result.repo_id);
        }

        let written = committed?;
        tracing::debug!("Committed {} check results", written);
        Ok(())
    }
}

/// Apply results in order within one transaction. The content timestamp
/// is only replaced by successful checks.
pub async fn commit_results(
    db: &DatabaseConnection,
    batch: &[CheckResult],
    now: i64,
) -> Result<usize, sea_orm::DbErr> {
    let txn = db.begin().await?;

    for result in batch {
        let mut update = Status::update_many()
            .col_expr(status::Column::Checked, Expr::value(now))
            .col_expr(status::Column::Result, Expr::value(result.outcome.code()));
        if result.outcome.is_ok() {
            update = update.col_expr(status::Column::Timestamp, Expr::value(result.timestamp));
        }

        update
            .filter(status::Column::MirrorId.eq(result.mirror_id))
            .filter(status::Column::RepoId.eq(result.repo_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(batch.len())
}
