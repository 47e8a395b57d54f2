//! One-shot patch application.
//!
//! Applies a single patch file to the repository, files it into the applied
//! or failed archive, and exits `0` on success, `1` on failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use patchdrop::exit_codes;
use patchdrop::io::config::load_workspace;
use patchdrop::io::git::Git;
use patchdrop::logging;
use patchdrop::pipeline::{ProcessOutcome, process_patch};

#[derive(Parser)]
#[command(
    name = "patchdrop",
    version,
    about = "Apply one patch file and archive it by outcome"
)]
struct Cli {
    /// Patch file to apply.
    patch: PathBuf,

    /// Repository root (defaults to the repository containing the current directory).
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Config file (defaults to `<repo>/.patchdrop.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(outcome) if outcome.success() => std::process::exit(exit_codes::OK),
        Ok(_) => std::process::exit(exit_codes::FAILED),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: &Cli) -> Result<ProcessOutcome> {
    let patch = std::path::absolute(&cli.patch)
        .with_context(|| format!("resolve {}", cli.patch.display()))?;
    let repo_root = match &cli.repo {
        Some(repo) => repo.clone(),
        None => {
            let cwd = std::env::current_dir().context("read current directory")?;
            Git::discover_toplevel(&cwd)?
        }
    };
    let workspace = load_workspace(&repo_root, cli.config.as_deref())?;
    let outcome = process_patch(&workspace, &patch)?;
    report(&outcome, cli.json)?;
    Ok(outcome)
}

fn report(outcome: &ProcessOutcome, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(outcome).context("serialize outcome")?;
        println!("{payload}");
        return Ok(());
    }
    let name = outcome
        .source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if outcome.success() {
        println!(
            "[OK] Applied {name} ({}) -> {}",
            outcome.result.strategy_used,
            outcome.archived_to.display()
        );
    } else {
        eprintln!(
            "[FAIL] Could not apply {name} ({}) -> {}",
            outcome.result.strategy_used,
            outcome.archived_to.display()
        );
        if let Some(detail) = &outcome.result.error_detail {
            eprintln!("{detail}");
        }
    }
    Ok(())
}
