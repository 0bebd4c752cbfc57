//! Dispatching stage: takes scheduled tasks and probes them on a bounded
//! worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use super::probe::Prober;
use super::{CheckResult, CheckTask, OutstandingChecks};

pub struct Dispatcher {
    pub prober: Prober,
    pub workers: Arc<Semaphore>,
    pub stagger: Duration,
    pub outstanding: OutstandingChecks,
}

impl Dispatcher {
    pub fn new(
        prober: Prober,
        max_concurrent: usize,
        stagger: Duration,
        outstanding: OutstandingChecks,
    ) -> Self {
        Self {
            prober,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
            stagger,
            outstanding,
        }
    }

    /// Consume tasks until the task queue closes
    pub async fn run(
        self,
        mut tasks: mpsc::Receiver<CheckTask>,
        results: mpsc::Sender<CheckResult>,
    ) {
        while let Some(task) = tasks.recv().await {
            if !task.valid {
                tracing::warn!(
                    mirror_id = task.mirror_id,
                    repo_id = task.repo_id,
                    "Skipping invalid task on {}",
                    task.url
                );
                self.outstanding.release(task.mirror_id, task.repo_id);
                continue;
            }

            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let prober = self.prober.clone();
            let results = results.clone();
            let outstanding = self.outstanding.clone();

            tokio::spawn(async move {
                tracing::debug!(url = %task.url, "Running check");
                let result = prober.probe(&task).await;
                tracing::debug!(url = %task.url, result = result.outcome.code(), "Check finished");

                if results.send(result).await.is_err() {
                    tracing::warn!("Result queue closed, dropping result for {}", task.url);
                    outstanding.release(task.mirror_id, task.repo_id);
                }
                drop(permit);
            });

            tokio::time::sleep(self.stagger).await;
        }

        tracing::info!("Task queue closed, dispatcher stopping");
    }
}
