//! Patchdrop configuration stored in `<repo>/.patchdrop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Config file name looked up at the repository root.
pub const CONFIG_FILE_NAME: &str = ".patchdrop.toml";

/// Patchdrop configuration (TOML).
///
/// Edited by humans; missing fields default to the layout
/// `patches/{incoming,applied,failed}` under the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatchdropConfig {
    /// Directory watched for new patches. Relative paths resolve against the repo root.
    pub inbox_dir: PathBuf,
    /// Destination for successfully applied patches.
    pub applied_dir: PathBuf,
    /// Destination for patches that failed to apply.
    pub failed_dir: PathBuf,
    /// Extension (without dot) a file needs to be considered a patch.
    pub patch_extension: String,

    pub stability: StabilityConfig,
    pub watch: WatchConfig,
    pub git: GitConfig,
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilityConfig {
    pub poll_interval_ms: u64,
    /// Consecutive unchanged size observations required.
    pub stable_polls: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Scan interval of the directory watcher.
    pub poll_interval_ms: u64,
    /// Dispatch patches already present in the inbox at startup.
    pub process_existing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub command_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Retry a failed (and aborted) mailbox apply as a raw diff.
    pub mailbox_fallback_to_raw_diff: bool,
    /// Restore touched paths to HEAD when a raw-diff apply or its commit fails.
    pub rollback_failed_raw_diff: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PushConfig {
    /// Remote to push HEAD to after a successful apply. Empty disables pushing.
    pub remote: String,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            stable_polls: 3,
            timeout_secs: 30,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            process_existing: false,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            mailbox_fallback_to_raw_diff: false,
            rollback_failed_raw_diff: true,
        }
    }
}

impl Default for PatchdropConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("patches/incoming"),
            applied_dir: PathBuf::from("patches/applied"),
            failed_dir: PathBuf::from("patches/failed"),
            patch_extension: "patch".to_string(),
            stability: StabilityConfig::default(),
            watch: WatchConfig::default(),
            git: GitConfig::default(),
            push: PushConfig::default(),
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GitConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl PushConfig {
    pub fn remote(&self) -> Option<&str> {
        let remote = self.remote.trim();
        (!remote.is_empty()).then_some(remote)
    }
}

impl PatchdropConfig {
    pub fn validate(&self) -> Result<()> {
        if self.patch_extension.trim().is_empty() || self.patch_extension.contains('.') {
            return Err(anyhow!(
                "patch_extension must be a non-empty extension without dots"
            ));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(anyhow!("stability.poll_interval_ms must be > 0"));
        }
        if self.stability.stable_polls == 0 {
            return Err(anyhow!("stability.stable_polls must be > 0"));
        }
        if self.stability.timeout_secs == 0 {
            return Err(anyhow!("stability.timeout_secs must be > 0"));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(anyhow!("watch.poll_interval_ms must be > 0"));
        }
        if self.git.command_timeout_secs == 0 {
            return Err(anyhow!("git.command_timeout_secs must be > 0"));
        }
        if self.git.output_limit_bytes == 0 {
            return Err(anyhow!("git.output_limit_bytes must be > 0"));
        }
        if self.applied_dir == self.failed_dir {
            return Err(anyhow!("applied_dir and failed_dir must differ"));
        }
        if self.applied_dir == self.inbox_dir || self.failed_dir == self.inbox_dir {
            return Err(anyhow!("archive directories must differ from inbox_dir"));
        }
        Ok(())
    }
}

/// Config with every directory resolved against a repository root.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub repo_root: PathBuf,
    pub inbox_dir: PathBuf,
    pub applied_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub config: PatchdropConfig,
}

impl Workspace {
    pub fn new(repo_root: impl Into<PathBuf>, config: PatchdropConfig) -> Self {
        let repo_root = repo_root.into();
        Self {
            inbox_dir: repo_root.join(&config.inbox_dir),
            applied_dir: repo_root.join(&config.applied_dir),
            failed_dir: repo_root.join(&config.failed_dir),
            repo_root,
            config,
        }
    }

    /// Archive directory for an apply outcome.
    pub fn archive_dir(&self, success: bool) -> &Path {
        if success {
            &self.applied_dir
        } else {
            &self.failed_dir
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PatchdropConfig::default()`.
pub fn load_config(path: &Path) -> Result<PatchdropConfig> {
    if !path.exists() {
        let cfg = PatchdropConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PatchdropConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config for `repo_root`, from `explicit` if given, else `<repo_root>/.patchdrop.toml`.
pub fn load_workspace(repo_root: &Path, explicit: Option<&Path>) -> Result<Workspace> {
    let path = explicit.map_or_else(|| repo_root.join(CONFIG_FILE_NAME), Path::to_path_buf);
    let config = load_config(&path)?;
    Ok(Workspace::new(repo_root, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PatchdropConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "inbox_dir = \"drop\"\n[stability]\ntimeout_secs = 5\n[push]\nremote = \"origin\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.inbox_dir, PathBuf::from("drop"));
        assert_eq!(cfg.stability.timeout_secs, 5);
        assert_eq!(cfg.stability.stable_polls, 3);
        assert_eq!(cfg.push.remote(), Some("origin"));
        assert_eq!(cfg.patch_extension, "patch");
    }

    #[test]
    fn rejects_zero_stable_polls() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[stability]\nstable_polls = 0\n").expect("write");

        let err = load_config(&path).expect_err("invalid config");
        assert!(format!("{err:#}").contains("stable_polls"));
    }

    #[test]
    fn rejects_archive_dir_equal_to_inbox() {
        let cfg = PatchdropConfig {
            applied_dir: PathBuf::from("patches/incoming"),
            ..PatchdropConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn blank_remote_disables_push() {
        let push = PushConfig {
            remote: "  ".to_string(),
        };
        assert_eq!(push.remote(), None);
    }

    #[test]
    fn workspace_resolves_dirs_against_root() {
        let ws = Workspace::new("/repo", PatchdropConfig::default());
        assert_eq!(ws.inbox_dir, PathBuf::from("/repo/patches/incoming"));
        assert_eq!(ws.archive_dir(true), Path::new("/repo/patches/applied"));
        assert_eq!(ws.archive_dir(false), Path::new("/repo/patches/failed"));
    }
}
