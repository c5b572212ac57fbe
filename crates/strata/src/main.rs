use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use strata::{FsSettingsStore, ScanReport, SettingsStore, Strata, Tier};

const TOTAL_WIDTH: usize = 80;

/// Strata - Tiered File Complexity Classification
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Classify every file in a tree by line-count tier, configured per directory scope")]
#[command(version)]
struct Cli {
  /// Workspace roots to scan
  #[arg(value_name = "ROOT", default_value = ".")]
  roots: Vec<PathBuf>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
  format: OutputFormat,

  /// Only show complex files
  #[arg(short, long)]
  quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
  Pretty,
  Json,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut roots = Vec::new();
  for root in &cli.roots {
    let root = root
      .canonicalize()
      .with_context(|| format!("cannot resolve root {}", root.display()))?;
    roots.push(root);
  }

  let store = Arc::new(FsSettingsStore::new(roots.clone()));
  tracing::debug!(scopes = store.known_scopes().len(), "discovered configured scopes");
  let engine = Strata::new(roots, store);

  let cancel = AtomicBool::new(false);
  let mut report = engine.scan(&cancel);
  report.entries.sort_by(|a, b| a.path.cmp(&b.path));

  match cli.format {
    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    OutputFormat::Pretty => print_report(&report, cli.quiet),
  }

  if report.tier_count(Tier::Complex) > 0 {
    process::exit(1);
  }
  Ok(())
}

fn print_report(report: &ScanReport, quiet: bool) {
  println!("{}", "Strata - File Complexity Tiers".purple().bold());
  println!();
  println!("{:<width$} {:>7} {}", "FILE", "LINES", "TIER", width = TOTAL_WIDTH - 14);
  println!("{}", "=".repeat(TOTAL_WIDTH));

  for entry in &report.entries {
    if quiet && entry.tier != Tier::Complex {
      continue;
    }
    let tier = match entry.tier {
      Tier::Simple => entry.tier.as_str().green(),
      Tier::Moderate => entry.tier.as_str().yellow(),
      Tier::Complex => entry.tier.as_str().red(),
    };
    let file = truncate_path(&entry.path.display().to_string(), TOTAL_WIDTH - 14);
    println!("{:<width$} {:>7} {}", file, entry.line_count, tier, width = TOTAL_WIDTH - 14);
  }

  for (path, reason) in &report.errors {
    eprintln!("Error reading {}: {}", path.display(), reason);
  }

  println!();
  println!(
    "{} simple, {} moderate, {} complex ({} excluded, {} errors)",
    report.tier_count(Tier::Simple),
    report.tier_count(Tier::Moderate),
    report.tier_count(Tier::Complex),
    report.excluded,
    report.errors.len(),
  );
  if !report.unclassified.is_empty() {
    println!("{} files not yet classified", report.unclassified.len());
  }
}

fn truncate_path(path: &str, max_width: usize) -> String {
  // Count and slice in chars; byte offsets can split a multi-byte character.
  let len = path.chars().count();
  if len <= max_width {
    path.to_string()
  } else {
    let keep = max_width.saturating_sub(3);
    let tail: String = path.chars().skip(len - keep).collect();
    format!("...{tail}")
  }
}
