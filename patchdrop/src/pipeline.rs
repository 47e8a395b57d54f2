//! One unit of work: classify, apply under the repository lock, push, archive.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::apply::{ApplyOptions, apply_patch};
use crate::core::types::{ApplicationResult, PatchFormat};
use crate::io::archive::archive_patch;
use crate::io::config::Workspace;
use crate::io::git::{Git, VersionControl};
use crate::io::lock::{LOCK_FILE_NAME, RepoLock};
use crate::io::patch::Patch;

/// Everything known about a processed patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    /// Where the patch was picked up.
    pub source: PathBuf,
    pub format: PatchFormat,
    pub result: ApplicationResult,
    /// Final resting place in the applied or failed archive.
    pub archived_to: PathBuf,
    /// True if HEAD was pushed to the configured remote.
    pub pushed: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

/// Git handle configured from the workspace.
pub fn workspace_git(workspace: &Workspace) -> Git {
    Git::new(&workspace.repo_root).with_limits(
        workspace.config.git.command_timeout(),
        workspace.config.git.output_limit_bytes,
    )
}

/// Process `path` against the workspace repository with real git.
pub fn process_patch(workspace: &Workspace, path: &Path) -> Result<ProcessOutcome> {
    let git = workspace_git(workspace);
    let lock_path = git.git_dir()?.join(LOCK_FILE_NAME);
    process_patch_with(workspace, &git, &lock_path, path)
}

/// Process `path` against `vcs`, serialized by the lock at `lock_path`.
///
/// Apply failures are reported in the outcome. `Err` means the patch could
/// not be processed at all (missing file, lock or archive I/O).
#[instrument(skip_all, fields(patch = %path.display()))]
pub fn process_patch_with<V: VersionControl>(
    workspace: &Workspace,
    vcs: &V,
    lock_path: &Path,
    path: &Path,
) -> Result<ProcessOutcome> {
    if !path.is_file() {
        bail!("patch file not found: {}", path.display());
    }
    let mut patch = Patch::new(path);
    let format = patch.format();
    info!(%format, "processing patch");

    // Held through archiving so concurrent workers never race on the tree or the archive names.
    let _lock = RepoLock::acquire(lock_path)?;

    let result = apply_patch(vcs, &patch, &ApplyOptions::from(&workspace.config.git));
    let pushed = result.success && push_if_configured(vcs, workspace.config.push.remote());

    let archived_to = archive_patch(patch.path(), workspace.archive_dir(result.success))?;
    patch.relocate(archived_to);

    if result.success {
        info!(strategy = %result.strategy_used, dest = %patch.path().display(), "applied");
    } else {
        warn!(
            strategy = %result.strategy_used,
            dest = %patch.path().display(),
            detail = result.error_detail.as_deref().unwrap_or_default(),
            "failed"
        );
    }

    Ok(ProcessOutcome {
        source: path.to_path_buf(),
        format,
        result,
        archived_to: patch.path().to_path_buf(),
        pushed,
    })
}

/// Push HEAD if a remote is configured and exists. Failures only log.
fn push_if_configured<V: VersionControl>(vcs: &V, remote: Option<&str>) -> bool {
    let Some(remote) = remote else {
        return false;
    };
    match vcs.remote_exists(remote) {
        Ok(true) => {}
        Ok(false) => {
            warn!(remote, "push remote not configured, skipping push");
            return false;
        }
        Err(err) => {
            warn!(remote, err = %format!("{err:#}"), "could not check push remote");
            return false;
        }
    }
    match vcs.push_head(remote) {
        Ok(out) if out.success() => {
            info!(remote, "pushed HEAD");
            true
        }
        Ok(out) => {
            warn!(remote, detail = %out.detail(), "push failed");
            false
        }
        Err(err) => {
            warn!(remote, err = %format!("{err:#}"), "push failed");
            false
        }
    }
}
