use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use diffpack_core::DiffConfig;

#[derive(Args)]
pub struct RunArgs {
    /// Repository URL or local path
    #[arg(long)]
    pub repo: String,

    /// Baseline (known-good) commit SHA
    #[arg(long)]
    pub good: String,

    /// Candidate commit SHA to compare against the baseline
    #[arg(long)]
    pub cand: String,

    /// Branch name, used only as a label and fetch hint
    #[arg(long)]
    pub branch: Option<String>,

    /// Total diff-body budget in bytes
    #[arg(long, default_value_t = 800_000)]
    pub cap_total: u64,

    /// Per-file diff-body budget in bytes
    #[arg(long, default_value_t = 64_000)]
    pub cap_file: u64,

    /// Context lines in unified diffs
    #[arg(long, default_value_t = 3)]
    pub context: u32,

    /// Rename detection threshold in percent
    #[arg(long, default_value_t = 90)]
    pub find_renames: u8,

    /// Write the envelope to this path instead of stdout
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Keep the temporary workspace after a successful run
    #[arg(long)]
    pub keep_workdir: bool,

    /// Keep the temporary workspace when the run fails
    #[arg(long)]
    pub keep_on_error: bool,
}

/// Executes the pipeline and emits the envelope as a single JSON
/// document. Returns the process exit code: 0 iff `ok:true`.
pub fn run(args: RunArgs) -> Result<i32> {
    let config = DiffConfig {
        repo_url: args.repo,
        commit_good: args.good,
        commit_candidate: args.cand,
        branch_name: args.branch,
        cap_total: args.cap_total,
        cap_file: args.cap_file,
        context_lines: args.context,
        find_renames_threshold: args.find_renames,
        keep_workdir: args.keep_workdir,
        keep_on_error: args.keep_on_error,
    };

    let envelope = diffpack_core::run(&config);
    let json = envelope
        .to_canonical_json()
        .context("failed to encode envelope")?;

    match &args.json {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} {}", "wrote".green(), path.display());
        }
        None => println!("{json}"),
    }

    Ok(if envelope.ok { 0 } else { 1 })
}
