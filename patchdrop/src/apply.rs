//! Patch Applier: strategy selection, fallback and failure recovery.
//!
//! - `Mailbox` patches go through the mailbox apply, which commits on its own.
//!   Any failure is followed by an abort so no apply session is left behind.
//! - `RawDiff` patches are applied to the index and committed once, with the
//!   file stem as message. A failure in either step fails the patch and (by
//!   default) rolls back whatever the apply changed. Only paths that were
//!   clean at HEAD or absent beforehand are restored; local edits and
//!   untracked files are never touched.
//!
//! Cleanup errors are logged and never replace the original failure.

use tracing::{debug, info, warn};

use crate::core::types::{ApplicationResult, PatchFormat, Strategy};
use crate::io::config::GitConfig;
use crate::io::git::{TouchedPath, VersionControl};
use crate::io::patch::Patch;

/// Knobs for [`apply_patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Retry a failed mailbox apply as a raw diff.
    pub mailbox_fallback_to_raw_diff: bool,
    /// Undo partial raw-diff applications.
    pub rollback_failed_raw_diff: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::from(&GitConfig::default())
    }
}

impl From<&GitConfig> for ApplyOptions {
    fn from(cfg: &GitConfig) -> Self {
        Self {
            mailbox_fallback_to_raw_diff: cfg.mailbox_fallback_to_raw_diff,
            rollback_failed_raw_diff: cfg.rollback_failed_raw_diff,
        }
    }
}

/// Apply `patch` to the working tree behind `vcs`.
///
/// Never returns an error: every failure is folded into the result.
pub fn apply_patch<V: VersionControl>(
    vcs: &V,
    patch: &Patch,
    options: &ApplyOptions,
) -> ApplicationResult {
    let format = patch.format();
    let content = match patch.content() {
        Ok(content) => content,
        Err(err) => return ApplicationResult::failed(format.strategy(), format!("{err:#}")),
    };
    match format {
        PatchFormat::RawDiff => apply_raw_diff(vcs, patch, content, options),
        PatchFormat::Mailbox => {
            let mailbox = apply_mailbox(vcs, content);
            if mailbox.success || !options.mailbox_fallback_to_raw_diff {
                return mailbox;
            }
            info!(patch = %patch.path().display(), "mailbox apply failed, retrying as raw diff");
            let mut fallback = apply_raw_diff(vcs, patch, content, options);
            if let (Some(first), Some(second)) =
                (mailbox.error_detail.as_deref(), fallback.error_detail.as_deref())
            {
                let combined = format!("mailbox: {first}\nraw-diff: {second}");
                fallback.error_detail = Some(combined);
            }
            fallback
        }
    }
}

fn apply_mailbox<V: VersionControl>(vcs: &V, content: &[u8]) -> ApplicationResult {
    let detail = match vcs.apply_mailbox(content) {
        Ok(out) if out.success() => return ApplicationResult::applied(Strategy::Mailbox),
        Ok(out) => out.detail(),
        Err(err) => format!("{err:#}"),
    };
    abort_mailbox_apply(vcs);
    ApplicationResult::failed(Strategy::Mailbox, detail)
}

/// Best-effort abort of a half-finished mailbox apply.
fn abort_mailbox_apply<V: VersionControl>(vcs: &V) {
    match vcs.abort_mailbox_apply() {
        Ok(out) if out.success() => debug!("aborted mailbox apply"),
        Ok(out) => warn!(detail = %out.detail(), "mailbox abort reported failure"),
        Err(err) => warn!(err = %format!("{err:#}"), "could not run mailbox abort"),
    }
}

fn apply_raw_diff<V: VersionControl>(
    vcs: &V,
    patch: &Patch,
    content: &[u8],
    options: &ApplyOptions,
) -> ApplicationResult {
    let touched = if options.rollback_failed_raw_diff {
        record_touched_paths(vcs, content)
    } else {
        None
    };
    let detail = match vcs.apply_raw_diff(content) {
        Ok(out) if out.success() => match vcs.commit(&patch.commit_message()) {
            Ok(out) if out.success() => return ApplicationResult::applied(Strategy::RawDiff),
            Ok(out) => format!("commit failed: {}", out.detail()),
            Err(err) => format!("commit failed: {err:#}"),
        },
        Ok(out) => out.detail(),
        Err(err) => format!("{err:#}"),
    };
    if let Some(touched) = touched.as_deref()
        && let Err(err) = vcs.rollback_raw_diff(touched)
    {
        warn!(err = %format!("{err:#}"), "raw diff rollback failed");
    }
    ApplicationResult::failed(Strategy::RawDiff, detail)
}

/// Snapshot taken before the apply; `None` disables rollback for this patch.
fn record_touched_paths<V: VersionControl>(vcs: &V, content: &[u8]) -> Option<Vec<TouchedPath>> {
    match vcs.touched_paths(content) {
        Ok(touched) => Some(touched),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not record touched paths, rollback skipped");
            None
        }
    }
}
