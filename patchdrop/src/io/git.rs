//! Git adapter for the patch pipeline.
//!
//! The pipeline only decides which git invocation to run and interprets its
//! exit code, so we keep a small, explicit wrapper around `git` subprocess
//! calls. [`VersionControl`] is the seam the Applier is written against.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_input, run_command_with_timeout};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Structured result of one version-control invocation.
///
/// Only `exit_code` gates control flow; the captured text is diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOutput {
    /// Exit code, or `None` if the process was killed (timeout or signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl VcsOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable failure text: stderr if present, else stdout.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {code}"),
            None => "terminated without exit code".to_string(),
        }
    }
}

impl From<CommandOutput> for VcsOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        }
    }
}

/// Operations the Applier needs from the revision-control tool.
///
/// Patch content is passed as bytes read once from the patch file.
/// `Err` means the tool could not be run at all; a tool that ran and failed
/// is an `Ok` output with a non-zero exit code.
pub trait VersionControl {
    /// Apply a mailbox-format patch with three-way fallback, creating its commit(s).
    fn apply_mailbox(&self, patch: &[u8]) -> Result<VcsOutput>;

    /// Abort an in-progress mailbox apply.
    fn abort_mailbox_apply(&self) -> Result<VcsOutput>;

    /// Apply a raw diff to the index and worktree, leaving `.rej` files for failed hunks.
    fn apply_raw_diff(&self, patch: &[u8]) -> Result<VcsOutput>;

    /// Commit what is staged.
    fn commit(&self, message: &str) -> Result<VcsOutput>;

    /// Record the current state of every path `patch` would touch.
    fn touched_paths(&self, patch: &[u8]) -> Result<Vec<TouchedPath>>;

    /// Undo a failed raw-diff apply on the paths recorded by [`Self::touched_paths`].
    fn rollback_raw_diff(&self, touched: &[TouchedPath]) -> Result<()>;

    /// Check whether a named remote is configured.
    fn remote_exists(&self, remote: &str) -> Result<bool>;

    /// Push HEAD to the same-named branch on `remote`.
    fn push_head(&self, remote: &str) -> Result<VcsOutput>;
}

/// State of a path before a raw diff was applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorState {
    /// Tracked, with index and worktree identical to HEAD.
    CleanAtHead,
    /// Not in HEAD, the index or the worktree.
    Absent,
    /// Local edits, staged changes, or an untracked or ignored file.
    /// Rollback leaves these alone.
    LocallyChanged,
}

/// A path named by a raw diff, with what it looked like beforehand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedPath {
    pub path: String,
    pub prior: PriorState,
    /// A `<path>.rej` file was already there.
    pub reject_existed: bool,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_limits(mut self, timeout: Duration, output_limit_bytes: usize) -> Self {
        self.timeout = timeout;
        self.output_limit_bytes = output_limit_bytes;
        self
    }

    /// Find the top-level directory of the repository containing `start`.
    #[instrument(skip_all, fields(start = %start.display()))]
    pub fn discover_toplevel(start: &Path) -> Result<PathBuf> {
        let out = Git::new(start).run_capture(&["rev-parse", "--show-toplevel"])?;
        let top = PathBuf::from(out.trim());
        debug!(root = %top.display(), "repository root");
        Ok(top)
    }

    /// Absolute path of the repository's git directory.
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Paths a patch would touch, without applying it.
    fn patch_paths(&self, patch: &[u8]) -> Result<Vec<String>> {
        let output = self.run_checked_with_input(&["apply", "--numstat", "-z"], Some(patch))?;
        Ok(parse_numstat_z(&output.stdout_text()))
    }

    /// Paths among `paths` that differ from HEAD or exist untracked or ignored.
    fn locally_changed(&self, paths: &[String]) -> Result<HashSet<String>> {
        let mut args = vec![
            "--literal-pathspecs",
            "status",
            "--porcelain=v1",
            "-z",
            "--untracked-files=all",
            "--ignored",
            "--",
        ];
        args.extend(paths.iter().map(String::as_str));
        let out = self.run_capture(&args)?;
        Ok(parse_status_z(&out))
    }

    fn in_head(&self, path: &str) -> Result<bool> {
        let object = format!("HEAD:{path}");
        Ok(self.run(&["cat-file", "-e", object.as_str()])?.success())
    }

    fn restore_path(&self, touched: &TouchedPath) -> Result<()> {
        let path = touched.path.as_str();
        match touched.prior {
            PriorState::CleanAtHead => {
                self.run_checked(&["--literal-pathspecs", "checkout", "HEAD", "--", path])?;
            }
            PriorState::Absent => {
                self.run_checked(&[
                    "--literal-pathspecs",
                    "rm",
                    "-q",
                    "-f",
                    "--cached",
                    "--ignore-unmatch",
                    "--",
                    path,
                ])?;
                remove_if_exists(&self.workdir.join(path))?;
            }
            PriorState::LocallyChanged => {
                debug!(path, "path had local changes before the apply, leaving it");
            }
        }
        if !touched.reject_existed {
            remove_if_exists(&self.workdir.join(format!("{path}.rej")))?;
        }
        Ok(())
    }

    fn run_capture<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout_text())
    }

    fn run_checked<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<CommandOutput> {
        self.run_checked_with_input(args, None)
    }

    fn run_checked_with_input<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let output = self.run_with_input(args, input)?;
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                display_args(args),
                output.stderr_text().trim()
            ));
        }
        Ok(output)
    }

    fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<CommandOutput> {
        self.run_with_input(args, None)
    }

    fn run_with_input<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        debug!(workdir = %self.workdir.display(), "git {}", display_args(args));
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        let output = match input {
            Some(input) => {
                run_command_with_input(cmd, input, self.timeout, self.output_limit_bytes)
            }
            None => run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes),
        };
        output.map_err(|err| err.context(format!("spawn git {}", display_args(args))))
    }

    /// Run a command whose failure the caller interprets.
    fn invoke(&self, args: &[&str], input: Option<&[u8]>) -> Result<VcsOutput> {
        let output: VcsOutput = self.run_with_input(args, input)?.into();
        if output.success() {
            if !output.stdout.trim().is_empty() {
                debug!(stdout = %output.stdout.trim(), "git {}", display_args(args));
            }
        } else {
            warn!(
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                stdout = %output.stdout.trim(),
                "git {} failed",
                display_args(args)
            );
        }
        Ok(output)
    }
}

impl VersionControl for Git {
    fn apply_mailbox(&self, patch: &[u8]) -> Result<VcsOutput> {
        self.invoke(&["am", "--3way"], Some(patch))
    }

    fn abort_mailbox_apply(&self) -> Result<VcsOutput> {
        self.invoke(&["am", "--abort"], None)
    }

    fn apply_raw_diff(&self, patch: &[u8]) -> Result<VcsOutput> {
        self.invoke(
            &[
                "apply",
                "--index",
                "--reject",
                "--ignore-whitespace",
                "--whitespace=nowarn",
            ],
            Some(patch),
        )
    }

    fn commit(&self, message: &str) -> Result<VcsOutput> {
        self.invoke(&["commit", "-q", "-m", message], None)
    }

    #[instrument(skip_all)]
    fn touched_paths(&self, patch: &[u8]) -> Result<Vec<TouchedPath>> {
        let paths = self.patch_paths(patch)?;
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let changed = self.locally_changed(&paths)?;
        let mut touched = Vec::with_capacity(paths.len());
        for path in paths {
            let on_disk = self.workdir.join(&path).symlink_metadata().is_ok();
            let prior = if changed.contains(&path) {
                PriorState::LocallyChanged
            } else if self.in_head(&path)? {
                PriorState::CleanAtHead
            } else if on_disk {
                PriorState::LocallyChanged
            } else {
                PriorState::Absent
            };
            let reject_existed = self.workdir.join(format!("{path}.rej")).exists();
            debug!(path = %path, ?prior, "recorded path before apply");
            touched.push(TouchedPath {
                path,
                prior,
                reject_existed,
            });
        }
        Ok(touched)
    }

    #[instrument(skip_all, fields(paths = touched.len()))]
    fn rollback_raw_diff(&self, touched: &[TouchedPath]) -> Result<()> {
        for entry in touched {
            if let Err(err) = self.restore_path(entry) {
                warn!(path = %entry.path, err = %format!("{err:#}"), "could not restore path");
            }
        }
        Ok(())
    }

    fn remote_exists(&self, remote: &str) -> Result<bool> {
        Ok(self.run(&["remote", "get-url", remote])?.success())
    }

    fn push_head(&self, remote: &str) -> Result<VcsOutput> {
        self.invoke(&["push", remote, "HEAD"], None)
    }
}

fn display_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow!("remove {}: {err}", path.display())),
    }
}

/// Parse `git apply --numstat -z` output into the touched paths.
///
/// Records are `added\tdeleted\tpath\0`; renames leave the path empty and
/// follow it with `old\0new\0`.
fn parse_numstat_z(raw: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = raw.split('\0');
    while let Some(record) = fields.next() {
        if record.is_empty() {
            continue;
        }
        let path = record.splitn(3, '\t').nth(2).unwrap_or_default();
        if path.is_empty() {
            paths.extend(fields.next().map(str::to_string));
            paths.extend(fields.next().map(str::to_string));
        } else {
            paths.push(path.to_string());
        }
    }
    paths.retain(|path| !path.is_empty());
    paths.dedup();
    paths
}

/// Parse `git status --porcelain=v1 -z` output into the paths it lists.
///
/// Records are `XY path\0`; renames and copies are followed by `source\0`.
fn parse_status_z(raw: &str) -> HashSet<String> {
    let mut paths = HashSet::new();
    let mut fields = raw.split('\0');
    while let Some(record) = fields.next() {
        let Some((code, path)) = record.split_at_checked(3) else {
            continue;
        };
        paths.insert(path.to_string());
        if code.contains(['R', 'C']) {
            paths.extend(fields.next().map(str::to_string));
        }
    }
    paths
}
