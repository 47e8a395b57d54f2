//! Shared types describing how a patch was applied.
//!
//! These are the contracts between the Applier, the pipeline and the
//! binaries. They carry no I/O state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Format of a patch file, decided from its first line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchFormat {
    /// Exported commit with envelope metadata (`From <sha> ...`).
    Mailbox,
    /// Plain unified diff without commit metadata.
    RawDiff,
}

impl PatchFormat {
    /// Strategy the Applier starts with for this format.
    pub fn strategy(self) -> Strategy {
        match self {
            PatchFormat::Mailbox => Strategy::Mailbox,
            PatchFormat::RawDiff => Strategy::RawDiff,
        }
    }
}

impl fmt::Display for PatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchFormat::Mailbox => f.write_str("mailbox"),
            PatchFormat::RawDiff => f.write_str("raw-diff"),
        }
    }
}

/// Version-control invocation used for an apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Mailbox apply with three-way fallback; creates the commit itself.
    Mailbox,
    /// Index apply with rejects, followed by one commit.
    RawDiff,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Mailbox => f.write_str("mailbox"),
            Strategy::RawDiff => f.write_str("raw-diff"),
        }
    }
}

/// Outcome of applying one patch.
///
/// `success` is true only when every version-control step of the chosen
/// strategy exited zero. There is no partial credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub success: bool,
    pub strategy_used: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ApplicationResult {
    pub fn applied(strategy: Strategy) -> Self {
        Self {
            success: true,
            strategy_used: strategy,
            error_detail: None,
        }
    }

    pub fn failed(strategy: Strategy, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            strategy_used: strategy,
            error_detail: Some(detail.into()),
        }
    }
}
