//! `state-bridge` — Renames the keys of a JSON state dict with a rule file.
//!
//! Reads a JSON object whose keys are parameter names, runs every key through
//! the rules, and writes the renamed object (in the original key order).
//!
//! **Usage:**
//! ```
//! state-bridge <MAPPING> --rules <FILE> [--out <FILE>] [--reverse]
//!              [--allow-collisions] [--whole-key] [--dry-run] [--verbose]
//! ```
//!
//! With `--dry-run` the renames are listed instead of written, and the
//! process exits non-zero if any new key would be produced twice while
//! collision detection is on.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use serde_json::Value;
use state_bridge::{bridge_with, parse_rules_with, plan, BridgeOptions, RenameStatus};
use tracing_subscriber::EnvFilter;

/// Rename the keys of a JSON state dict.
#[derive(Parser, Debug)]
#[command(
    name = "state-bridge",
    about = "Rename state-dict keys with declarative capture/arithmetic rules"
)]
struct Args {
    /// JSON file containing the mapping to rename (a top-level object).
    mapping: PathBuf,

    /// Rule file: one `source, destination` pair per line.
    #[arg(long)]
    rules: PathBuf,

    /// Output file for the renamed mapping (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Apply every rule from destination back to source.
    #[arg(long)]
    reverse: bool,

    /// Let later keys overwrite earlier ones instead of failing on collision.
    #[arg(long)]
    allow_collisions: bool,

    /// Only rename keys that a rule matches in their entirety.
    #[arg(long)]
    whole_key: bool,

    /// Print the planned renames without writing the mapping.
    #[arg(long)]
    dry_run: bool,

    /// Log compilation and rename details to stderr.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> BridgeOptions {
        BridgeOptions::default()
            .reverse(self.reverse)
            .detect_collision(!self.allow_collisions)
            .anchored(self.whole_key)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded in another process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_mapping(path: &Path) -> Result<IndexMap<String, Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read mapping {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON object", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = args.options();
    let mapping = read_mapping(&args.mapping)?;
    let rules_text = std::fs::read_to_string(&args.rules)
        .with_context(|| format!("cannot read rules {}", args.rules.display()))?;

    if args.dry_run {
        let rules = parse_rules_with(&rules_text, &options)?;
        let report = plan(mapping.keys(), &rules)?;

        for entry in &report.entries {
            let status = match entry.status {
                RenameStatus::Unchanged => "KEEP",
                RenameStatus::Renamed => "RENAME",
                RenameStatus::Collision => "COLLIDE",
            };
            println!("[{}] {} -> {}", status, entry.original, entry.renamed);
        }
        println!();
        println!(
            "Summary: {} keys, {} renamed, {} collisions",
            report.entries.len(),
            report.renamed_count(),
            report.collision_count()
        );

        if options.detect_collision && report.has_collisions() {
            eprintln!(
                "Dry run FAILED: {} key collision(s).",
                report.collision_count()
            );
            process::exit(1);
        }
        return Ok(());
    }

    let renamed = bridge_with(&mapping, &rules_text, &options)?;
    let json = serde_json::to_string_pretty(&renamed).context("cannot serialize mapping")?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("cannot write {}", path.display()))?;
            tracing::info!(keys = renamed.len(), out = %path.display(), "wrote renamed mapping");
        }
        None => println!("{json}"),
    }

    Ok(())
}
