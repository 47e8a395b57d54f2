//! Deterministic names derived from patch file names.

use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Fallback commit message when the file name has no usable stem.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Apply patch";

/// Commit message for a raw diff: the file name with its extension stripped.
pub fn commit_message_for(patch_path: &Path) -> String {
    match patch_path.file_stem().map(|stem| stem.to_string_lossy()) {
        Some(stem) if !stem.trim().is_empty() => stem.into_owned(),
        _ => DEFAULT_COMMIT_MESSAGE.to_string(),
    }
}

/// File name for the `n`-th collision of `file_name`.
///
/// `n == 0` returns the name unchanged; otherwise ` (n)` is inserted before
/// the extension: `foo.patch` -> `foo (2).patch`, `foo` -> `foo (2)`.
/// Non-UTF-8 names keep their original bytes.
pub fn disambiguated_name(file_name: &OsStr, n: u32) -> OsString {
    if n == 0 {
        return file_name.to_os_string();
    }
    let path = Path::new(file_name);
    let mut name = path.file_stem().unwrap_or(file_name).to_os_string();
    name.push(format!(" ({n})"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// True if `path` has `extension`, compared ASCII case-insensitively.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
