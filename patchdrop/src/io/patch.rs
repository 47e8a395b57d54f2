//! Handle for one patch file moving through the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::core::format::classify_first_line;
use crate::core::naming::{commit_message_for, has_extension};
use crate::core::types::PatchFormat;

/// Longest first line inspected for classification.
const FIRST_LINE_LIMIT: usize = 4096;

/// A patch file. Its bytes are read once, on first use, and everything
/// downstream (classification and the apply itself) works from that copy.
#[derive(Debug)]
pub struct Patch {
    path: PathBuf,
    content: OnceLock<Result<Vec<u8>, String>>,
    format: OnceLock<PatchFormat>,
}

impl Patch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: OnceLock::new(),
            format: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The patch bytes as first read from disk.
    pub fn content(&self) -> Result<&[u8]> {
        let content = self.content.get_or_init(|| {
            fs::read(&self.path).map_err(|err| format!("read patch {}: {err}", self.path.display()))
        });
        match content {
            Ok(bytes) => Ok(bytes),
            Err(err) => Err(anyhow!("{err}")),
        }
    }

    /// Classified format. Unreadable files classify as `RawDiff`; the apply
    /// step reports the real error.
    pub fn format(&self) -> PatchFormat {
        *self.format.get_or_init(|| match self.content() {
            Ok(bytes) => {
                let format = classify_first_line(&first_line(bytes));
                debug!(patch = %self.path.display(), %format, "classified patch");
                format
            }
            Err(err) => {
                warn!(
                    patch = %self.path.display(),
                    err = %err,
                    "could not read patch for classification, treating as raw diff"
                );
                PatchFormat::RawDiff
            }
        })
    }

    /// Commit message used when the patch carries no commit metadata.
    pub fn commit_message(&self) -> String {
        commit_message_for(&self.path)
    }

    /// Record that the file now lives at `path`.
    pub fn relocate(&mut self, path: PathBuf) {
        self.path = path;
    }
}

/// First line of `content`, without its line terminator.
pub fn first_line(content: &[u8]) -> String {
    let head = &content[..content.len().min(FIRST_LINE_LIMIT)];
    let line = head.split(|byte| *byte == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(line)
        .trim_end_matches('\r')
        .to_string()
}

/// True if `path` is a regular file carrying the patch extension.
pub fn is_patch_file(path: &Path, extension: &str) -> bool {
    has_extension(path, extension) && fs::metadata(path).is_ok_and(|meta| meta.is_file())
}
