//! Filing processed patches into outcome directories without clobbering.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::core::naming::disambiguated_name;

/// First free path for `file_name` in `dir`: `name.ext`, then `name (1).ext`, `name (2).ext`, ...
pub fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let mut n = 0u32;
    loop {
        let candidate = dir.join(disambiguated_name(file_name, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move `path` into `dest_dir`, creating the directory if needed.
///
/// Returns the final location. An existing file is never overwritten.
pub fn archive_patch(path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("patch path has no file name: {}", path.display()))?;
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("create archive dir {}", dest_dir.display()))?;

    let dest = unique_destination(dest_dir, file_name);
    move_file(path, &dest)?;
    info!(from = %path.display(), dest = %dest.display(), "archived patch");
    Ok(dest)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Rename fails across filesystems; fall back to copy + delete.
            debug!(err = %rename_err, "rename failed, copying instead");
            fs::copy(from, to)
                .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
            fs::remove_file(from).with_context(|| format!("remove {}", from.display()))?;
            Ok(())
        }
    }
}
