use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use relocpatch::batch::batch::{Batch, BatchReport};
use relocpatch::config::config::PatchConfig;
use relocpatch::rewriter::rewriter::{BinaryPathRewriter, WriteMode};

#[derive(Parser)]
#[command(version, about = "Redirect hardcoded paths in shared libraries of an application bundle")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite the configured paths in every target file below the bundle directory
    Patch {
        /// Bundle directory the relative targets are resolved against
        #[arg(short, long, default_value = "AppDir")]
        app_dir: PathBuf,

        /// JSON configuration with targets and candidates, defaults to the built-in WebKitGTK 4.1 table
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Files to patch instead of the configured targets
        #[arg(short, long)]
        target: Vec<PathBuf>,

        /// Overwrite matches directly in the original file instead of renaming a rewritten copy over it
        #[arg(long)]
        in_place: bool,

        /// The file path to save the JSON report
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Count occurrences in every target file without writing anything
    Scan {
        /// Bundle directory the relative targets are resolved against
        #[arg(short, long, default_value = "AppDir")]
        app_dir: PathBuf,

        /// JSON configuration with targets and candidates, defaults to the built-in WebKitGTK 4.1 table
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Files to scan instead of the configured targets
        #[arg(short, long)]
        target: Vec<PathBuf>,

        /// The file path to save the JSON report
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Check a configuration file without touching any target
    Validate {
        /// JSON configuration, defaults to the built-in WebKitGTK 4.1 table
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the built-in configuration as JSON, as a starting point for a custom one
    Defaults {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// The configuration is loaded and validated before any target is opened.
fn run_batch(
    app_dir: &Path,
    config_path: Option<&Path>,
    targets: Vec<PathBuf>,
    mode: WriteMode,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = PatchConfig::load_or_default(config_path).context("invalid configuration")?;
    let targets = if targets.is_empty() {
        config.resolve_targets(app_dir)
    } else {
        targets
    };

    let rewriter = BinaryPathRewriter::new(mode);
    info!(
        "Applying {} candidates to {} targets ({:?} write)",
        config.candidates.len(),
        targets.len(),
        rewriter.mode()
    );
    let report = Batch::new(&rewriter, &config.candidates)
        .dry_run(dry_run)
        .run(&targets);

    info!(
        "{} of {} files {}, {} occurrences, {} skipped",
        report.patched(),
        report.files.len(),
        if dry_run { "matched" } else { "patched" },
        report.occurrences(),
        report.skipped()
    );
    if let Some(report_path) = report_path {
        save_report(&report, report_path)?;
    }
    Ok(())
}

fn save_report(report: &BatchReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    info!("Report saved to: {}", path.display());
    Ok(())
}

fn validate(config_path: Option<&Path>) -> Result<()> {
    let config = PatchConfig::load_or_default(config_path).context("invalid configuration")?;
    if config.candidates.is_empty() {
        warn!("Configuration has no candidates");
    }
    for candidate in config.candidates.candidates() {
        println!("{} ({} bytes)", candidate, candidate.byte_len());
    }
    for target in config.targets.iter() {
        println!("target: {}", target.display());
    }
    println!(
        "OK: {} candidates, {} targets",
        config.candidates.len(),
        config.targets.len()
    );
    Ok(())
}

fn defaults(output: Option<&Path>) -> Result<()> {
    let config = PatchConfig::webkit2gtk_4_1()?;
    let json = serde_json::to_string_pretty(&config)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Default configuration saved to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    match args.command {
        Command::Patch {
            app_dir,
            config,
            target,
            in_place,
            report,
        } => {
            let mode = if in_place {
                WriteMode::InPlace
            } else {
                WriteMode::Atomic
            };
            run_batch(
                &app_dir,
                config.as_deref(),
                target,
                mode,
                false,
                report.as_deref(),
            )
        }
        Command::Scan {
            app_dir,
            config,
            target,
            report,
        } => run_batch(
            &app_dir,
            config.as_deref(),
            target,
            WriteMode::default(),
            true,
            report.as_deref(),
        ),
        Command::Validate { config } => validate(config.as_deref()),
        Command::Defaults { output } => defaults(output.as_deref()),
    }
}
