//! Checker pipeline storage tests
//!
//! Covers:
//! - selection of stale (mirror, repo) pairs
//! - batch commits of check results
//! - scheduler and committer tick behavior
//! - pairs in flight are queued once until their result is written

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::mpsc;

mod common;
use common::{create_test_db, insert_mirror, insert_repo, insert_status};

use mirrorlist::config::backend::BackendConfig;
use mirrorlist::models::prelude::*;
use mirrorlist::models::repo;
use mirrorlist::services::checker::committer::{commit_results, CommitResultsTask};
use mirrorlist::services::checker::outcome::CheckOutcome;
use mirrorlist::services::checker::scheduler::{
    find_next_check, PeriodicTask, ScheduleChecksTask,
};
use mirrorlist::services::checker::{
    CheckResult, CheckTask, CheckerPipeline, OutstandingChecks,
};

const NL: (&str, &str, &str) = ("EU", "NL", "NH");
const NOW: i64 = 1_700_000_000;

// ============================================================================
// find_next_check
// ============================================================================

#[tokio::test]
async fn test_stale_pairs_selected_oldest_first() {
    let db = create_test_db().await;
    let base = insert_repo(&db, 8, "8-stream", "BaseOS", "x86_64", false).await;
    let m1 = insert_mirror(&db, "one.example.org", "/centos/", "", NL).await;
    let m2 = insert_mirror(&db, "two.example.org", "centos", "", NL).await;
    let m3 = insert_mirror(&db, "three.example.org", "centos", "", NL).await;
    insert_status(&db, m1.id, base.id, 0, NOW - 5000, 200).await;
    insert_status(&db, m2.id, base.id, 0, 0, 0).await;
    // Checked recently, not due yet
    insert_status(&db, m3.id, base.id, 0, NOW - 10, 200).await;

    let tasks = find_next_check(&db, 10, 3600, NOW, &HashSet::new()).await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(
        tasks[0],
        CheckTask {
            mirror_id: m2.id,
            repo_id: base.id,
            url: "http://two.example.org/centos/8-stream/BaseOS/x86_64/os".to_string(),
            iso: false,
            altarch: false,
            valid: true,
        }
    );
    assert_eq!(tasks[1].mirror_id, m1.id);
    assert_eq!(
        tasks[1].url,
        "http://one.example.org/centos/8-stream/BaseOS/x86_64/os"
    );
}

#[tokio::test]
async fn test_limit_and_disabled_repos() {
    let db = create_test_db().await;
    let enabled = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let disabled = insert_repo(&db, 9, "9-stream", "CRB", "x86_64", false).await;
    let mut active: repo::ActiveModel = disabled.clone().into();
    active.enabled = Set(false);
    active.update(&db).await.unwrap();

    for i in 0..3 {
        let m = insert_mirror(&db, &format!("m{}.example.org", i), "centos", "", NL).await;
        insert_status(&db, m.id, enabled.id, 0, i, 0).await;
        insert_status(&db, m.id, disabled.id, 0, 0, 0).await;
    }

    let tasks = find_next_check(&db, 2, 0, NOW, &HashSet::new()).await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.repo_id == enabled.id));
}

#[tokio::test]
async fn test_missing_basedir_yields_invalid_task() {
    let db = create_test_db().await;
    let iso = insert_repo(&db, 9, "9-stream", "isos", "aarch64", true).await;
    let m = insert_mirror(&db, "main.example.org", "centos", "", NL).await;
    insert_status(&db, m.id, iso.id, 0, 0, 0).await;

    let tasks = find_next_check(&db, 10, 0, NOW, &HashSet::new()).await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert!(!tasks[0].valid);
    assert!(tasks[0].iso);
    assert!(tasks[0].altarch);
    assert_eq!(tasks[0].url, "http://main.example.org/9-stream/isos/aarch64");
}

#[tokio::test]
async fn test_skipped_pairs_do_not_count_against_limit() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let m = insert_mirror(&db, &format!("m{}.example.org", i), "centos", "", NL).await;
        insert_status(&db, m.id, repo.id, 0, i, 0).await;
        ids.push(m.id);
    }

    let skip: HashSet<(i64, i64)> = [(ids[0], repo.id)].into_iter().collect();
    let tasks = find_next_check(&db, 2, 0, NOW, &skip).await.unwrap();

    let selected: Vec<i64> = tasks.iter().map(|t| t.mirror_id).collect();
    assert_eq!(selected, vec![ids[1], ids[2]]);
}

// ============================================================================
// commit_results
// ============================================================================

#[tokio::test]
async fn test_commit_updates_checked_and_timestamp() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let ok = insert_mirror(&db, "ok.example.org", "centos", "", NL).await;
    let failing = insert_mirror(&db, "down.example.org", "centos", "", NL).await;
    insert_status(&db, ok.id, repo.id, 100, 0, 0).await;
    insert_status(&db, failing.id, repo.id, 100, 0, 200).await;

    let batch = vec![
        CheckResult {
            mirror_id: ok.id,
            repo_id: repo.id,
            timestamp: 1_699_999_000,
            outcome: CheckOutcome::OK,
        },
        CheckResult {
            mirror_id: failing.id,
            repo_id: repo.id,
            timestamp: 0,
            outcome: CheckOutcome::Timeout,
        },
    ];

    let written = commit_results(&db, &batch, NOW).await.unwrap();
    assert_eq!(written, 2);

    let ok_row = Status::find_by_id((ok.id, repo.id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ok_row.timestamp, 1_699_999_000);
    assert_eq!(ok_row.checked, NOW);
    assert_eq!(ok_row.result, 200);

    let failed_row = Status::find_by_id((failing.id, repo.id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed_row.timestamp, 100);
    assert_eq!(failed_row.checked, NOW);
    assert_eq!(failed_row.result, -2);
}

// ============================================================================
// Periodic stages
// ============================================================================

#[tokio::test]
async fn test_scheduler_only_refills_an_empty_queue() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    for i in 0..3 {
        let m = insert_mirror(&db, &format!("m{}.example.org", i), "centos", "", NL).await;
        insert_status(&db, m.id, repo.id, 0, 0, 0).await;
    }

    let (tx, mut rx) = mpsc::channel::<CheckTask>(2);
    let task = ScheduleChecksTask {
        tasks: tx,
        batch_size: 2,
        rescan_interval: 60,
        tick: Duration::from_millis(10),
        outstanding: OutstandingChecks::new(),
    };

    task.run(&db).await.unwrap();
    assert_eq!(rx.len(), 2);

    // Queue not drained yet: nothing is added
    rx.recv().await.unwrap();
    task.run(&db).await.unwrap();
    assert_eq!(rx.len(), 1);

    // Drained, but the first two are still awaiting their results
    rx.recv().await.unwrap();
    task.run(&db).await.unwrap();
    assert_eq!(rx.len(), 1);
    assert_eq!(task.outstanding.len(), 3);
}

#[tokio::test]
async fn test_pair_is_not_requeued_before_its_result_is_committed() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let m = insert_mirror(&db, "m.example.org", "centos", "", NL).await;
    insert_status(&db, m.id, repo.id, 0, 0, 0).await;

    let outstanding = OutstandingChecks::new();
    let (task_tx, mut task_rx) = mpsc::channel::<CheckTask>(2);
    let schedule = ScheduleChecksTask {
        tasks: task_tx,
        batch_size: 2,
        rescan_interval: 60,
        tick: Duration::from_millis(10),
        outstanding: outstanding.clone(),
    };
    let (result_tx, result_rx) = mpsc::channel::<CheckResult>(2);
    let commit = CommitResultsTask::new(
        result_rx,
        outstanding.clone(),
        2,
        Duration::ZERO,
        Duration::from_millis(10),
    );

    schedule.run(&db).await.unwrap();
    let queued = task_rx.recv().await.unwrap();
    assert!(outstanding.contains(m.id, repo.id));

    // The check is running: the queue is empty but `checked` is unchanged
    for _ in 0..3 {
        schedule.run(&db).await.unwrap();
        assert!(task_rx.is_empty());
    }

    result_tx
        .send(CheckResult {
            mirror_id: queued.mirror_id,
            repo_id: queued.repo_id,
            timestamp: 42,
            outcome: CheckOutcome::OK,
        })
        .await
        .unwrap();
    commit.run(&db).await.unwrap();
    assert!(outstanding.is_empty());

    let row = Status::find_by_id((m.id, repo.id)).one(&db).await.unwrap().unwrap();
    assert!(row.checked > 0);

    // Fresh again, so nothing is due
    schedule.run(&db).await.unwrap();
    assert!(task_rx.is_empty());
}

#[tokio::test]
async fn test_running_pipeline_checks_each_pair_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/centos/9-stream/BaseOS/x86_64/repodata/repomd.xml",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                "<repomd><data><timestamp>1700000042</timestamp></data></repomd>"
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let m = insert_mirror(&db, &addr.to_string(), "centos", "", NL).await;
    insert_status(&db, m.id, repo.id, 0, 0, 0).await;

    let config = BackendConfig {
        rescan_interval: 3600,
        queue_capacity: 4,
        tick_ms: 20,
        dispatch_stagger_ms: 0,
        commit_tick_ms: 20,
        commit_linger_secs: 0,
        ..BackendConfig::default()
    };
    let pipeline = CheckerPipeline::start(db.clone(), &config).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    pipeline.abort();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let row = Status::find_by_id((m.id, repo.id)).one(&db).await.unwrap().unwrap();
    assert!(row.checked > 0);
    assert_eq!(row.result, 200);
    assert_eq!(row.timestamp, 1_700_000_042);
}

#[tokio::test]
async fn test_committer_waits_for_half_full_queue() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let a = insert_mirror(&db, "a.example.org", "centos", "", NL).await;
    let b = insert_mirror(&db, "b.example.org", "centos", "", NL).await;
    insert_status(&db, a.id, repo.id, 0, 0, 0).await;
    insert_status(&db, b.id, repo.id, 0, 0, 0).await;

    let (tx, rx) = mpsc::channel::<CheckResult>(4);
    let task = CommitResultsTask::new(
        rx,
        OutstandingChecks::new(),
        4,
        Duration::from_secs(3600),
        Duration::from_millis(10),
    );
    let result = |mirror_id| CheckResult {
        mirror_id,
        repo_id: repo.id,
        timestamp: 42,
        outcome: CheckOutcome::OK,
    };

    tx.send(result(a.id)).await.unwrap();
    task.run(&db).await.unwrap();
    let row = Status::find_by_id((a.id, repo.id)).one(&db).await.unwrap().unwrap();
    assert_eq!(row.checked, 0, "a single result is below the batch threshold");

    tx.send(result(b.id)).await.unwrap();
    task.run(&db).await.unwrap();
    for mirror_id in [a.id, b.id] {
        let row = Status::find_by_id((mirror_id, repo.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(row.checked > 0);
        assert_eq!(row.timestamp, 42);
    }
}

#[tokio::test]
async fn test_committer_flushes_after_linger() {
    let db = create_test_db().await;
    let repo = insert_repo(&db, 9, "9-stream", "BaseOS", "x86_64", false).await;
    let a = insert_mirror(&db, "a.example.org", "centos", "", NL).await;
    insert_status(&db, a.id, repo.id, 0, 0, 0).await;

    let (tx, rx) = mpsc::channel::<CheckResult>(20);
    let task = CommitResultsTask::new(
        rx,
        OutstandingChecks::new(),
        20,
        Duration::from_millis(50),
        Duration::from_millis(10),
    );

    tx.send(CheckResult {
        mirror_id: a.id,
        repo_id: repo.id,
        timestamp: 0,
        outcome: CheckOutcome::HostNotFound,
    })
    .await
    .unwrap();

    task.run(&db).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    task.run(&db).await.unwrap();

    let row = Status::find_by_id((a.id, repo.id)).one(&db).await.unwrap().unwrap();
    assert_eq!(row.result, -1);
    assert!(row.checked > 0);
}
