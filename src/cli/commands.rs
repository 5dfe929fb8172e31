//! Command implementations for the EPF importer CLI
//!
//! Sets up logging, resolves the configuration, runs or resumes the import
//! and prints the final report.

use crate::cli::args::Args;
use crate::config::ImportConfig;
use crate::constants::LOG_FILE_PREFIX;
use crate::importer::{ImportSummary, Importer};
use crate::ingest::IngestOutcome;
use crate::store::{SqliteStore, TargetStore};
use anyhow::{Context, Result};
use colored::*;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Set up structured logging on stderr, plus a daily rolling log file when
/// `--log-dir` is given.
///
/// The returned guard flushes the file writer and must outlive the import.
pub fn setup_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("epf_ingest={}", log_level)));

    let console = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(fmt::time::uptime())
        .with_writer(std::io::stderr);

    let guard = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()?;
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()?;
            None
        }
    };

    debug!("Logging initialized at level: {}", log_level);
    Ok(guard)
}

/// Load the configuration file and overlay the command-line options
pub fn load_configuration(args: &Args) -> Result<ImportConfig> {
    let path = args.config_path();
    let config = ImportConfig::load_or_create(&path, args.preset())
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok(args.apply_to(config)?)
}

/// Run or resume the import described by `args`
pub fn run(args: &Args) -> Result<ImportSummary> {
    let config = load_configuration(args)?;
    info!(
        "Connecting to database {} on {}",
        config.database.name, config.database.host
    );
    let store = SqliteStore::connect(&config.database).context("Failed to open the database")?;

    let mut importer =
        Importer::new(store, config, &args.snapshot_file)?.with_progress(args.show_progress());

    let summary = if args.resume {
        importer
            .resume()
            .with_context(|| format!("Failed to resume from {}", args.snapshot_file.display()))?
    } else {
        importer.run(&args.directories)?
    };
    Ok(summary)
}

/// Print a colored report of the import
pub fn print_summary(summary: &ImportSummary) {
    println!();
    println!("{}", "EPF import summary".bright_green().bold());

    for outcome in &summary.directories {
        println!("{}", outcome.dir.display().to_string().bright_cyan());
        for report in &outcome.reports {
            let status = match &report.outcome {
                IngestOutcome::Completed => "ok".green(),
                IngestOutcome::Skipped { .. } => "skipped".yellow(),
            };
            let mut line = format!(
                "  {:<40} {:>12} records  {:>6.1}s  {}",
                report.table,
                report.records_written,
                report.elapsed.as_secs_f64(),
                report.strategy
            );
            if report.records_rejected > 0 {
                line.push_str(&format!("  ({} rejected)", report.records_rejected));
            }
            if report.checkpoint_failures > 0 {
                line.push_str(&format!(
                    "  {}",
                    format!("({} checkpoints not saved)", report.checkpoint_failures).red()
                ));
            }
            println!("{} {}", status, line);
        }
        if !outcome.imported_before.is_empty() {
            println!(
                "{}     {} files imported before the interruption",
                "ok".green(),
                outcome.imported_before.len()
            );
        }
        for name in &outcome.failed {
            println!("{}   {}", "failed".red().bold(), name);
        }
    }

    let total: u64 = summary.reports().map(|r| r.records_written).sum();
    println!();
    println!(
        "{} files imported, {} records, {} failed, in {:.1}s",
        summary.reports().count().to_string().bright_white().bold(),
        total,
        if summary.is_clean() {
            "0".green()
        } else {
            summary.failed_count().to_string().red().bold()
        },
        summary.elapsed.as_secs_f64()
    );
}
