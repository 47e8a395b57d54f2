//! Test-only helpers: throwaway git repositories and sample patches.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::config::{PatchdropConfig, Workspace};
use crate::io::git::Git;

/// A git repository in a temp dir with one commit and an identity configured.
///
/// Tracked files: `README.md` (`hello\nworld\n`) and `notes.txt` (`alpha\n`).
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.name", "Patchdrop Test"])?;
        repo.git(&["config", "user.email", "patchdrop@example.invalid"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "hello\nworld\n")?;
        repo.write("notes.txt", "alpha\n")?;
        repo.write(".gitignore", "patches/\n")?;
        repo.commit_all("initial")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_handle(&self) -> Git {
        Git::new(self.path())
    }

    /// Workspace with the default `patches/` layout, inbox created.
    pub fn workspace(&self) -> Result<Workspace> {
        let workspace = Workspace::new(self.path(), PatchdropConfig::default());
        fs::create_dir_all(&workspace.inbox_dir)
            .with_context(|| format!("create {}", workspace.inbox_dir.display()))?;
        Ok(workspace)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Stage everything and commit it.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<u64> {
        let out = self.git(&["rev-list", "--count", "HEAD"])?;
        out.trim()
            .parse()
            .with_context(|| format!("unexpected rev-list output '{}'", out.trim()))
    }

    /// Subject line of the HEAD commit.
    pub fn head_subject(&self) -> Result<String> {
        Ok(self.git(&["log", "-1", "--format=%s"])?.trim().to_string())
    }

    /// `git status --porcelain` lines, untracked files included.
    pub fn status(&self) -> Result<Vec<String>> {
        let out = self.git(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// True if a mailbox apply stopped partway and is waiting for `--continue`/`--abort`.
    pub fn mailbox_apply_in_progress(&self) -> Result<bool> {
        let git_dir = self.git(&["rev-parse", "--absolute-git-dir"])?;
        Ok(Path::new(git_dir.trim())
            .join("rebase-apply")
            .join("applying")
            .exists())
    }

    /// Run git in the repository, failing on non-zero exit.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Unified diff replacing `world` with `there` in `README.md`.
pub const README_DIFF: &str = "\
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1,2 +1,2 @@
 hello
-world
+there
";

/// Unified diff replacing `alpha` with `beta` in `notes.txt`.
pub const NOTES_DIFF: &str = "\
diff --git a/notes.txt b/notes.txt
--- a/notes.txt
+++ b/notes.txt
@@ -1 +1 @@
-alpha
+beta
";

/// Unified diff creating `added.txt` containing `fresh`.
pub const ADDED_FILE_DIFF: &str = "\
diff --git a/added.txt b/added.txt
new file mode 100644
--- /dev/null
+++ b/added.txt
@@ -0,0 +1 @@
+fresh
";

/// Mailbox patch whose hunk targets lines that do not exist in [`TestRepo`].
pub const MISMATCHED_MAILBOX: &str = "\
From abc123@example.invalid Mon Sep 17 00:00:00 2001
From: Someone Else <someone@example.invalid>
Date: Mon, 1 Jan 2024 00:00:00 +0000
Subject: [PATCH] Change missing lines

---
 README.md | 2 +-
 1 file changed, 1 insertion(+), 1 deletion(-)

diff --git a/README.md b/README.md
index 0000001..0000002 100644
--- a/README.md
+++ b/README.md
@@ -1,2 +1,2 @@
 nothing
-like
+this
-- 
2.43.0

";
