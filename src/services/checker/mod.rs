//! Freshness checker pipeline
//!
//! Three stages run concurrently, connected by two bounded queues:
//! the scheduler finds stale (mirror, repo) pairs, the dispatcher probes
//! them, and the committer writes results back in batches.

pub mod committer;
pub mod dispatcher;
pub mod outcome;
pub mod probe;
pub mod scheduler;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::backend::BackendConfig;
use crate::error::Result;
use committer::CommitResultsTask;
use dispatcher::Dispatcher;
use outcome::CheckOutcome;
use probe::Prober;
use scheduler::{run_task, ScheduleChecksTask};

/// One probe to run
#[derive(Debug, Clone, PartialEq)]
pub struct CheckTask {
    pub mirror_id: i64,
    pub repo_id: i64,
    pub url: String,
    pub iso: bool,
    pub altarch: bool,
    /// False when the mirror lacks the base directory for the repo
    pub valid: bool,
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub mirror_id: i64,
    pub repo_id: i64,
    /// Upstream content timestamp, 0 if unknown
    pub timestamp: i64,
    pub outcome: CheckOutcome,
}

/// (mirror, repo) pairs handed out by the scheduler whose result has not
/// been committed yet. Shared by all three stages.
#[derive(Debug, Clone, Default)]
pub struct OutstandingChecks {
    pairs: Arc<Mutex<HashSet<(i64, i64)>>>,
}

impl OutstandingChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already outstanding
    pub fn insert(&self, mirror_id: i64, repo_id: i64) -> bool {
        self.pairs.lock().insert((mirror_id, repo_id))
    }

    pub fn release(&self, mirror_id: i64, repo_id: i64) {
        self.pairs.lock().remove(&(mirror_id, repo_id));
    }

    pub fn contains(&self, mirror_id: i64, repo_id: i64) -> bool {
        self.pairs.lock().contains(&(mirror_id, repo_id))
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.lock().is_empty()
    }

    pub fn snapshot(&self) -> HashSet<(i64, i64)> {
        self.pairs.lock().clone()
    }
}

/// Handles of the running pipeline stages
pub struct CheckerPipeline {
    handles: Vec<JoinHandle<()>>,
}

impl CheckerPipeline {
    /// Spawn all stages on the current runtime
    pub fn start(db: DatabaseConnection, config: &BackendConfig) -> Result<Self> {
        let capacity = config.queue_capacity.max(1);
        let (task_tx, task_rx) = mpsc::channel::<CheckTask>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<CheckResult>(capacity);
        let db = Arc::new(db);
        let outstanding = OutstandingChecks::new();

        let prober = Prober::new(&config.user_agent, config.probe_timeout())?;
        let dispatcher = Dispatcher::new(
            prober,
            config.max_concurrent_probes,
            config.dispatch_stagger(),
            outstanding.clone(),
        );

        let schedule = ScheduleChecksTask {
            tasks: task_tx,
            batch_size: capacity,
            rescan_interval: config.rescan_interval as i64,
            tick: config.tick(),
            outstanding: outstanding.clone(),
        };
        let commit = CommitResultsTask::new(
            result_rx,
            outstanding,
            capacity,
            config.commit_linger(),
            config.commit_tick(),
        );

        let handles = vec![
            tokio::spawn(run_task(Box::new(schedule), db.clone())),
            tokio::spawn(dispatcher.run(task_rx, result_tx)),
            tokio::spawn(run_task(Box::new(commit), db)),
        ];

        tracing::info!(
            "Checker started (rescan every {}s, {} concurrent probes)",
            config.rescan_interval,
            config.max_concurrent_probes
        );

        Ok(Self { handles })
    }

    /// Stop all stages. In-flight probes are abandoned.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for CheckerPipeline {
    fn drop(&mut self) {
        self.abort();
    }
}
