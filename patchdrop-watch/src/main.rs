//! Watch an inbox directory and apply every patch dropped into it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use patchdrop::io::config::load_workspace;
use patchdrop::io::git::Git;
use patchdrop::logging;
use patchdrop_watch::watcher::run_watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "patchdrop-watch")]
#[command(about = "Apply patch files dropped into an inbox directory")]
struct Args {
    /// Repository root (defaults to the repository containing the current directory).
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Config file (defaults to `<repo>/.patchdrop.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also apply patches already sitting in the inbox at startup.
    #[arg(long)]
    process_existing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let repo_root = match args.repo {
        Some(repo) => repo,
        None => {
            let cwd = std::env::current_dir().context("read current directory")?;
            Git::discover_toplevel(&cwd)?
        }
    };
    let mut workspace = load_workspace(&repo_root, args.config.as_deref())?;
    if args.process_existing {
        workspace.config.watch.process_existing = true;
    }
    info!(repo = %workspace.repo_root.display(), "starting patchdrop-watch");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                on_signal.cancel();
            }
            Err(err) => warn!(err = %err, "could not listen for interrupt"),
        }
    });

    run_watch(Arc::new(workspace), cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let args = Args::parse_from(["patchdrop-watch"]);
        assert!(args.repo.is_none());
        assert!(!args.process_existing);
    }

    #[test]
    fn parse_process_existing() {
        let args = Args::parse_from(["patchdrop-watch", "--repo", "/srv/app", "--process-existing"]);
        assert_eq!(args.repo, Some(PathBuf::from("/srv/app")));
        assert!(args.process_existing);
    }
}
