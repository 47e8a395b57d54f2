//! Patch format classification.

use crate::core::types::PatchFormat;

/// Token that opens a mailbox-format patch (`git format-patch` output).
pub const MAILBOX_PREFIX: &str = "From ";

/// Classify a patch from its first line.
///
/// - `Mailbox` if the line starts with the literal `From ` (trailing space
///   included).
/// - `RawDiff` for everything else, including an empty file.
pub fn classify_first_line(first_line: &str) -> PatchFormat {
    if first_line.starts_with(MAILBOX_PREFIX) {
        PatchFormat::Mailbox
    } else {
        PatchFormat::RawDiff
    }
}
