//! File stability detection.
//!
//! A heuristic for "the writer is done": the file size has not changed for a
//! number of consecutive polls. Writers that pause longer than the window
//! can still be caught mid-write; only writer cooperation would avoid that.

use std::path::Path;
use std::time::Duration;

use patchdrop::io::config::StabilityConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a stability wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Size unchanged for the required number of polls.
    Stable,
    /// The timeout elapsed first.
    TimedOut,
    /// The file disappeared (moved or deleted) before it settled.
    Vanished,
    /// Shutdown was requested.
    Cancelled,
}

impl Stability {
    pub fn is_stable(self) -> bool {
        self == Stability::Stable
    }
}

/// Polling parameters for [`wait_for_stable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    pub stable_polls: u32,
    pub timeout: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self::from(&StabilityConfig::default())
    }
}

impl From<&StabilityConfig> for StabilityPolicy {
    fn from(cfg: &StabilityConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            stable_polls: cfg.stable_polls,
            timeout: cfg.timeout(),
        }
    }
}

/// Poll `path` until its size settles, it vanishes, the timeout elapses or `cancel` fires.
pub async fn wait_for_stable(
    path: &Path,
    policy: &StabilityPolicy,
    cancel: &CancellationToken,
) -> Stability {
    let poll = async {
        let Some(mut last) = file_size(path).await else {
            return Stability::Vanished;
        };
        let mut unchanged = 0u32;
        loop {
            tokio::time::sleep(policy.poll_interval).await;
            let Some(size) = file_size(path).await else {
                return Stability::Vanished;
            };
            if size == last {
                unchanged += 1;
                if unchanged >= policy.stable_polls {
                    return Stability::Stable;
                }
            } else {
                debug!(path = %path.display(), size, "file still growing");
                unchanged = 0;
                last = size;
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Stability::Cancelled,
        polled = tokio::time::timeout(policy.timeout, poll) => polled.unwrap_or(Stability::TimedOut),
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}
