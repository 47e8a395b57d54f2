//! End-to-end tests for the inbox watch loop against real git repositories.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use patchdrop::io::config::Workspace;
use patchdrop::test_support::{NOTES_DIFF, README_DIFF, TestRepo};
use patchdrop_watch::watcher::{WatchReport, run_watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Workspace with short polling so tests settle quickly.
fn fast_workspace(repo: &TestRepo) -> Workspace {
    let mut workspace = repo.workspace().expect("workspace");
    workspace.config.stability.poll_interval_ms = 20;
    workspace.config.watch.poll_interval_ms = 50;
    workspace.config.watch.process_existing = true;
    workspace
}

fn start(workspace: Workspace) -> (CancellationToken, JoinHandle<anyhow::Result<WatchReport>>) {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_watch(Arc::new(workspace), cancel.clone()));
    (cancel, handle)
}

async fn wait_for_files(dir: &Path, count: usize, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0) >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_patches_are_both_applied() {
    let repo = TestRepo::new().expect("repo");
    let workspace = fast_workspace(&repo);
    let inbox = workspace.inbox_dir.clone();
    let applied = workspace.applied_dir.clone();
    let commits_before = repo.commit_count().expect("count");

    let (cancel, handle) = start(workspace);
    let writers: Vec<_> = [("readme-there.patch", README_DIFF), ("notes-beta.patch", NOTES_DIFF)]
        .into_iter()
        .map(|(name, body)| {
            let path = inbox.join(name);
            thread::spawn(move || std::fs::write(path, body).expect("write patch"))
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer");
    }

    assert!(
        wait_for_files(&applied, 2, Duration::from_secs(20)).await,
        "both patches should be archived as applied"
    );
    cancel.cancel();
    let report = handle.await.expect("join").expect("watch");

    assert_eq!(report.applied, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(repo.commit_count().expect("count"), commits_before + 2);
    let subjects: HashSet<String> = repo
        .git(&["log", "-2", "--format=%s"])
        .expect("log")
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        subjects,
        HashSet::from(["readme-there".to_string(), "notes-beta".to_string()])
    );
    assert_eq!(repo.read("README.md").expect("read"), "hello\nthere\n");
    assert_eq!(repo.read("notes.txt").expect("read"), "beta\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_patch_lands_in_failed_and_watch_continues() {
    let repo = TestRepo::new().expect("repo");
    let workspace = fast_workspace(&repo);
    let inbox = workspace.inbox_dir.clone();
    let failed = workspace.failed_dir.clone();
    let applied = workspace.applied_dir.clone();

    let (cancel, handle) = start(workspace);
    std::fs::write(inbox.join("broken.patch"), "not a diff\n").expect("write broken");
    assert!(wait_for_files(&failed, 1, Duration::from_secs(20)).await);
    std::fs::write(inbox.join("notes-beta.patch"), NOTES_DIFF).expect("write good");
    assert!(wait_for_files(&applied, 1, Duration::from_secs(20)).await);

    cancel.cancel();
    let report = handle.await.expect("join").expect("watch");
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 1);
    assert!(failed.join("broken.patch").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsettled_patch_is_left_in_inbox() {
    let repo = TestRepo::new().expect("repo");
    let mut workspace = fast_workspace(&repo);
    // Unreachable threshold: the stability wait always times out.
    workspace.config.stability.stable_polls = 10_000;
    workspace.config.stability.timeout_secs = 1;
    let patch = workspace.inbox_dir.join("slow.patch");
    std::fs::write(&patch, README_DIFF).expect("write patch");
    let applied = workspace.applied_dir.clone();
    let failed = workspace.failed_dir.clone();

    let (cancel, handle) = start(workspace);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    cancel.cancel();
    let report = handle.await.expect("join").expect("watch");

    assert_eq!(report.skipped, 1);
    assert!(patch.exists());
    assert!(!applied.exists());
    assert!(!failed.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_patch_files_are_ignored() {
    let repo = TestRepo::new().expect("repo");
    let workspace = fast_workspace(&repo);
    let note = workspace.inbox_dir.join("README.txt");
    std::fs::write(&note, "drop .patch files here\n").expect("write note");

    let (cancel, handle) = start(workspace);
    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();
    let report = handle.await.expect("join").expect("watch");

    assert_eq!(report, WatchReport::default());
    assert!(note.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_interrupts_stability_polling_promptly() {
    let repo = TestRepo::new().expect("repo");
    let mut workspace = fast_workspace(&repo);
    workspace.config.stability.stable_polls = 10_000;
    workspace.config.stability.timeout_secs = 600;
    let patch = workspace.inbox_dir.join("pending.patch");
    std::fs::write(&patch, README_DIFF).expect("write patch");

    let (cancel, handle) = start(workspace);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stop_requested = Instant::now();
    cancel.cancel();
    let report = handle.await.expect("join").expect("watch");

    assert!(stop_requested.elapsed() < Duration::from_secs(2));
    assert_eq!(report.skipped, 1);
    assert!(patch.exists());
    assert!(repo.status().expect("status").is_empty());
}
