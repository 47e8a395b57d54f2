//! Inbox watch loop.
//!
//! Observes the inbox for new files, waits for each qualifying patch to
//! settle, then hands it to the patch pipeline on the blocking pool. The loop
//! itself never applies anything; failures stay inside their own task.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use patchdrop::io::config::Workspace;
use patchdrop::io::patch::is_patch_file;
use patchdrop::pipeline::{ProcessOutcome, process_patch};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::stability::{Stability, StabilityPolicy, wait_for_stable};

/// Counts of what a watch session did, returned after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub applied: usize,
    pub failed: usize,
    /// Patches left in the inbox (not stable in time, vanished, or shutdown).
    pub skipped: usize,
    /// Patches whose pipeline errored (lock or archive I/O).
    pub errors: usize,
}

/// Result of one dispatched patch.
#[derive(Debug)]
enum TaskOutcome {
    Processed(Box<ProcessOutcome>),
    Skipped(Stability),
    Errored,
}

impl WatchReport {
    fn record(&mut self, joined: Result<TaskOutcome, JoinError>) {
        match joined {
            Ok(TaskOutcome::Processed(outcome)) if outcome.success() => self.applied += 1,
            Ok(TaskOutcome::Processed(_)) => self.failed += 1,
            Ok(TaskOutcome::Skipped(_)) => self.skipped += 1,
            Ok(TaskOutcome::Errored) => self.errors += 1,
            Err(err) => {
                error!(err = %err, "patch task panicked");
                self.errors += 1;
            }
        }
    }
}

/// Watch the workspace inbox until `cancel` fires.
///
/// On shutdown, stability polls stop at once; patches already handed to the
/// pipeline run to completion before this returns.
pub async fn run_watch(workspace: Arc<Workspace>, cancel: CancellationToken) -> Result<WatchReport> {
    let inbox = workspace.inbox_dir.clone();
    tokio::fs::create_dir_all(&inbox)
        .await
        .with_context(|| format!("create inbox {}", inbox.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(err = %err, "watch error"),
        },
        notify::Config::default()
            .with_poll_interval(Duration::from_millis(workspace.config.watch.poll_interval_ms)),
    )
    .context("create inbox watcher")?;
    watcher
        .watch(&inbox, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", inbox.display()))?;
    info!(path = %inbox.display(), "watching inbox");

    let mut dispatcher = Dispatcher::new(workspace.clone(), cancel.clone());
    if workspace.config.watch.process_existing {
        for path in existing_entries(&inbox)? {
            dispatcher.offer(path);
        }
    }

    let mut report = WatchReport::default();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(event) => {
                    for path in created_paths(&event) {
                        dispatcher.offer(path);
                    }
                }
                None => {
                    warn!("watch channel closed");
                    break;
                }
            },
            Some(joined) = dispatcher.tasks.join_next(), if !dispatcher.tasks.is_empty() => {
                report.record(joined);
            }
        }
    }

    drop(watcher);
    info!(
        in_flight = dispatcher.tasks.len(),
        "shutting down, waiting for in-flight patches"
    );
    while let Some(joined) = dispatcher.tasks.join_next().await {
        report.record(joined);
    }
    info!(
        applied = report.applied,
        failed = report.failed,
        skipped = report.skipped,
        errors = report.errors,
        "watcher stopped"
    );
    Ok(report)
}

/// Paths a notify event reports as newly present.
fn created_paths(event: &NotifyEvent) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.clone()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Inbox entries present right now, in name order.
fn existing_entries(inbox: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in
        std::fs::read_dir(inbox).with_context(|| format!("read inbox {}", inbox.display()))?
    {
        let entry = entry.with_context(|| format!("read inbox entry in {}", inbox.display()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

struct Dispatcher {
    workspace: Arc<Workspace>,
    policy: StabilityPolicy,
    cancel: CancellationToken,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    tasks: JoinSet<TaskOutcome>,
}

impl Dispatcher {
    fn new(workspace: Arc<Workspace>, cancel: CancellationToken) -> Self {
        Self {
            policy: StabilityPolicy::from(&workspace.config.stability),
            workspace,
            cancel,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tasks: JoinSet::new(),
        }
    }

    /// Spawn a task for `path` if it is a patch in the inbox and not already being handled.
    fn offer(&mut self, path: PathBuf) {
        if path.parent() != Some(self.workspace.inbox_dir.as_path())
            || !is_patch_file(&path, &self.workspace.config.patch_extension)
        {
            debug!(path = %path.display(), "ignoring non-patch entry");
            return;
        }
        let Some(claim) = InFlight::claim(&self.in_flight, &path) else {
            debug!(path = %path.display(), "patch already in flight");
            return;
        };
        info!(patch = %path.display(), "patch detected");

        let workspace = self.workspace.clone();
        let policy = self.policy;
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let _claim = claim;
            handle_patch(workspace, path, policy, cancel).await
        });
    }
}

async fn handle_patch(
    workspace: Arc<Workspace>,
    path: PathBuf,
    policy: StabilityPolicy,
    cancel: CancellationToken,
) -> TaskOutcome {
    let stability = wait_for_stable(&path, &policy, &cancel).await;
    match stability {
        Stability::Stable => {}
        Stability::TimedOut => {
            warn!(patch = %path.display(), "patch did not settle in time, leaving it in the inbox");
            return TaskOutcome::Skipped(stability);
        }
        Stability::Vanished => {
            info!(patch = %path.display(), "patch disappeared before it settled");
            return TaskOutcome::Skipped(stability);
        }
        Stability::Cancelled => {
            debug!(patch = %path.display(), "stability wait cancelled");
            return TaskOutcome::Skipped(stability);
        }
    }
    if cancel.is_cancelled() {
        return TaskOutcome::Skipped(Stability::Cancelled);
    }
    info!(patch = %path.display(), "patch stable");

    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || process_patch(&workspace, &task_path)).await {
        Ok(Ok(outcome)) => TaskOutcome::Processed(Box::new(outcome)),
        Ok(Err(err)) => {
            error!(patch = %path.display(), err = %format!("{err:#}"), "could not process patch");
            TaskOutcome::Errored
        }
        Err(err) => {
            error!(patch = %path.display(), err = %err, "patch pipeline panicked");
            TaskOutcome::Errored
        }
    }
}

/// Membership in the in-flight set, released on drop.
struct InFlight {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<PathBuf>>>, path: &Path) -> Option<Self> {
        if !lock_or_recover(set).insert(path.to_path_buf()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock_or_recover(&self.set).remove(&self.path);
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
