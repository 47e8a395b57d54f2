//! Applier and pipeline tests against real git repositories.

use std::fs;

use patchdrop::apply::{ApplyOptions, apply_patch};
use patchdrop::core::types::{PatchFormat, Strategy};
use patchdrop::io::patch::Patch;
use patchdrop::pipeline::process_patch;
use patchdrop::test_support::{
    ADDED_FILE_DIFF, MISMATCHED_MAILBOX, NOTES_DIFF, README_DIFF, TestRepo,
};

/// Commit a change, export it with `git format-patch`, then drop the commit.
fn exported_mailbox_patch(repo: &TestRepo) -> String {
    repo.write("notes.txt", "alpha\ngamma\n").expect("edit");
    repo.git(&["commit", "-q", "-am", "Add gamma to notes"])
        .expect("commit");
    let patch = repo.git(&["format-patch", "-1", "--stdout"]).expect("format-patch");
    repo.git(&["reset", "-q", "--hard", "HEAD~1"]).expect("reset");
    patch
}

#[test]
fn mailbox_patch_keeps_its_commit_message() {
    let repo = TestRepo::new().expect("repo");
    let contents = exported_mailbox_patch(&repo);
    let path = repo
        .write("patches/incoming/0001-add-gamma.patch", &contents)
        .expect("write patch");
    let git = repo.git_handle();

    let patch = Patch::new(&path);
    assert_eq!(patch.format(), PatchFormat::Mailbox);
    let result = apply_patch(&git, &patch, &ApplyOptions::default());

    assert!(result.success, "{:?}", result.error_detail);
    assert_eq!(result.strategy_used, Strategy::Mailbox);
    assert_eq!(repo.head_subject().expect("subject"), "Add gamma to notes");
    assert_eq!(repo.read("notes.txt").expect("read"), "alpha\ngamma\n");
}

#[test]
fn failed_mailbox_leaves_no_apply_session() {
    let repo = TestRepo::new().expect("repo");
    let path = repo
        .write("patches/incoming/0001-change.patch", MISMATCHED_MAILBOX)
        .expect("write patch");
    let git = repo.git_handle();

    let result = apply_patch(&git, &Patch::new(&path), &ApplyOptions::default());

    assert!(!result.success);
    assert_eq!(result.strategy_used, Strategy::Mailbox);
    assert!(result.error_detail.is_some());
    assert!(!repo.mailbox_apply_in_progress().expect("am state"));
    assert!(repo.status().expect("status").is_empty());
}

#[test]
fn consecutive_patches_apply_after_a_failure() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    let bad = repo
        .write("patches/incoming/0001-change.patch", MISMATCHED_MAILBOX)
        .expect("write bad");
    let good = repo
        .write("patches/incoming/fix-notes.patch", NOTES_DIFF)
        .expect("write good");

    let first = process_patch(&workspace, &bad).expect("process bad");
    let second = process_patch(&workspace, &good).expect("process good");

    assert!(!first.success());
    assert!(second.success());
    assert_eq!(repo.head_subject().expect("subject"), "fix-notes");
    assert_eq!(repo.read("notes.txt").expect("read"), "beta\n");
}

#[test]
fn partially_applied_raw_diff_is_rolled_back() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    // First hunk applies to notes.txt, second cannot apply to README.md.
    let partial = format!(
        "{NOTES_DIFF}{}",
        README_DIFF.replace(" hello\n", " goodbye\n")
    );
    let path = repo
        .write("patches/incoming/partial.patch", &partial)
        .expect("write patch");
    let commits_before = repo.commit_count().expect("count");

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(!outcome.success());
    assert_eq!(outcome.archived_to, workspace.failed_dir.join("partial.patch"));
    assert_eq!(repo.commit_count().expect("count"), commits_before);
    assert_eq!(repo.read("notes.txt").expect("read"), "alpha\n");
    assert!(!repo.path().join("README.md.rej").exists());
    assert!(repo.status().expect("status").is_empty());
}

#[test]
fn raw_diff_adding_a_file_is_rolled_back_on_commit_failure() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    let path = repo
        .write("patches/incoming/add-file.patch", ADDED_FILE_DIFF)
        .expect("write patch");
    // A failing pre-commit hook makes the commit step fail after a clean apply.
    repo.write(".git/hooks/pre-commit", "#!/bin/sh\nexit 1\n")
        .expect("write hook");
    make_executable(&repo.path().join(".git/hooks/pre-commit"));

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(!outcome.success());
    assert!(
        outcome
            .result
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.starts_with("commit failed"))
    );
    assert!(!repo.path().join("added.txt").exists());
    assert!(repo.status().expect("status").is_empty());
}

#[test]
fn refused_new_file_keeps_existing_untracked_file() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    repo.write("added.txt", "mine\n").expect("write untracked");
    let path = repo
        .write("patches/incoming/add-file.patch", ADDED_FILE_DIFF)
        .expect("write patch");

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(!outcome.success());
    assert!(
        outcome
            .result
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("already exists"))
    );
    assert_eq!(repo.read("added.txt").expect("read"), "mine\n");
    assert_eq!(repo.status().expect("status"), vec!["?? added.txt"]);
}

#[test]
fn refused_diff_keeps_uncommitted_edits() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    repo.write("README.md", "hello\nworld\nlocal edit\n")
        .expect("edit readme");
    let path = repo
        .write("patches/incoming/fix-readme.patch", README_DIFF)
        .expect("write patch");
    let commits_before = repo.commit_count().expect("count");

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(!outcome.success());
    assert_eq!(repo.commit_count().expect("count"), commits_before);
    assert_eq!(
        repo.read("README.md").expect("read"),
        "hello\nworld\nlocal edit\n"
    );
    assert_eq!(repo.status().expect("status"), vec![" M README.md"]);
}

#[test]
fn whitespace_differences_do_not_block_a_raw_diff() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    repo.write("spacing.txt", "a b\nend\n").expect("write");
    repo.commit_all("add spacing").expect("commit");
    // Context has extra internal spaces; the added line ends in spaces.
    let diff = concat!(
        "diff --git a/spacing.txt b/spacing.txt\n",
        "--- a/spacing.txt\n",
        "+++ b/spacing.txt\n",
        "@@ -1,2 +1,3 @@\n",
        " a    b\n",
        "+added  \n",
        " end\n",
    );
    let path = repo
        .write("patches/incoming/spacing.patch", diff)
        .expect("write patch");

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(outcome.success(), "{:?}", outcome.result.error_detail);
    assert_eq!(repo.head_subject().expect("subject"), "spacing");
    let contents = repo.read("spacing.txt").expect("read");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].trim_end(), "added");
    assert_eq!(lines[2], "end");
    assert!(repo.status().expect("status").is_empty());
}

#[test]
fn empty_patch_fails_and_is_archived() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    let path = repo
        .write("patches/incoming/empty.patch", "")
        .expect("write patch");

    let outcome = process_patch(&workspace, &path).expect("process");

    assert!(!outcome.success());
    assert_eq!(outcome.format, PatchFormat::RawDiff);
    assert!(workspace.failed_dir.join("empty.patch").exists());
}

#[test]
fn archived_name_collisions_are_numbered() {
    let repo = TestRepo::new().expect("repo");
    let workspace = repo.workspace().expect("workspace");
    fs::create_dir_all(&workspace.failed_dir).expect("mkdir failed");
    fs::write(workspace.failed_dir.join("foo.patch"), "older").expect("seed");

    let path = repo
        .write("patches/incoming/foo.patch", "")
        .expect("write patch");
    let outcome = process_patch(&workspace, &path).expect("process");

    assert_eq!(outcome.archived_to, workspace.failed_dir.join("foo (1).patch"));
    assert_eq!(
        fs::read_to_string(workspace.failed_dir.join("foo.patch")).expect("read"),
        "older"
    );
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) {}
