//! CLI entry point for `mboxsite`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxsite::config::{self, Config};
use mboxsite::Archive;

#[derive(Parser)]
#[command(
    name = "mboxsite",
    version,
    about = "Thread, sanitize and index a mailing-list MBOX export"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides $MBOXSITE_CONFIG and the default location)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the corpus and report statistics and warnings
    Build {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the search index as JSON
    Index { path: PathBuf },
    /// Search messages
    Search {
        path: PathBuf,
        query: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => config::load_config(),
    };

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Build { path, json } => cmd_build(&path, json, &config),
        Commands::Index { path } => cmd_index(&path, &config),
        Commands::Search { path, query, json } => cmd_search(&path, &query, json, &config),
    }
}

/// Set up tracing with stderr output and optional file logging.
///
/// An explicit `-v` level wins over `RUST_LOG`, which wins over the config.
fn setup_logging(verbose_level: Option<&str>, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let env_filter = match verbose_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
    };

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxsite.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Run the pipeline over a file with a byte progress bar.
fn load_archive(path: &Path, config: &Config) -> anyhow::Result<Archive> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("cannot read {}", path.display()))?
        .len();

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Reading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let archive = mboxsite::build_archive_from_path(
        path,
        config,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    );
    pb.finish_and_clear();
    Ok(archive?)
}

/// Build the corpus and print statistics.
fn cmd_build(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let start = Instant::now();
    let archive = load_archive(path, config)?;
    let elapsed = start.elapsed();
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    if json {
        print_build_json(path, file_size, &archive, elapsed)
    } else {
        print_build_table(path, file_size, &archive, elapsed, config)
    }
}

/// Print the search index.
fn cmd_index(path: &Path, config: &Config) -> anyhow::Result<()> {
    let archive = load_archive(path, config)?;
    println!("{}", archive.search.to_json()?);
    Ok(())
}

/// Search messages and print the hits.
fn cmd_search(path: &Path, query: &str, json: bool, config: &Config) -> anyhow::Result<()> {
    let archive = load_archive(path, config)?;
    let results = archive.search.search(query);

    if json {
        print_search_results_json(&archive, &results)
    } else {
        print_search_results_table(&archive, &results);
        Ok(())
    }
}

/// Warning counts keyed by degradation kind.
fn warnings_by_kind(archive: &Archive) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for w in &archive.warnings {
        *counts.entry(w.degradation.kind()).or_insert(0) += 1;
    }
    counts
}

/// Print statistics in a human-readable table.
fn print_build_table(
    path: &Path,
    file_size: u64,
    archive: &Archive,
    elapsed: std::time::Duration,
    config: &Config,
) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let corpus = &archive.corpus;
    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "Size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Group", corpus.group_name);
    println!("  {:<20} {}", "Messages", corpus.len());
    println!("  {:<20} {}", "Threads", corpus.threads.len());
    println!("  {:<20} {}", "Placeholders", corpus.placeholder_count());

    let dates = corpus.messages.iter().filter_map(|m| m.message.sent_at);
    if let (Some(min), Some(max)) = (dates.clone().min(), dates.max()) {
        println!(
            "  {:<20} {} to {}",
            "Date range",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }

    println!(
        "  {:<20} {}",
        "Index pages",
        corpus.index_pages(config.corpus.threads_per_page).len()
    );
    println!("  {:<20} {}", "Search digest", archive.search.digest()?);
    println!("  {:<20} {:.2?}", "Build time", elapsed);

    let by_kind = warnings_by_kind(archive);
    if !by_kind.is_empty() {
        println!();
        println!("  Warnings:");
        for (kind, count) in &by_kind {
            println!("    {count:>6}  {kind}");
        }
        println!();
        for w in &archive.warnings {
            println!("    {w}");
        }
    }
    println!();
    Ok(())
}

/// Print statistics as JSON.
fn print_build_json(
    path: &Path,
    file_size: u64,
    archive: &Archive,
    elapsed: std::time::Duration,
) -> anyhow::Result<()> {
    let corpus = &archive.corpus;
    let output = serde_json::json!({
        "file": path.display().to_string(),
        "file_size": file_size,
        "group_name": corpus.group_name,
        "message_count": corpus.len(),
        "thread_count": corpus.threads.len(),
        "placeholder_count": corpus.placeholder_count(),
        "search_digest": archive.search.digest()?,
        "build_time_ms": elapsed.as_millis() as u64,
        "warnings_by_kind": warnings_by_kind(archive),
        "warnings": archive.warnings,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_search_results_table(archive: &Archive, results: &[u64]) {
    println!();
    println!("  {} result(s)", results.len());
    println!();

    if results.is_empty() {
        return;
    }

    println!(
        "  {:<6} {:<17} {:<25} {:<40} {:>6}",
        "Id", "Date", "From", "Subject", "Thread"
    );
    println!("  {}", "-".repeat(98));

    for m in results.iter().filter_map(|&id| archive.corpus.message(id)) {
        let date = m
            .message
            .sent_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let from_trunc: String = m.message.sender.display().chars().take(24).collect();
        let subj_trunc: String = m.message.subject.chars().take(39).collect();

        println!(
            "  {:<6} {:<17} {:<25} {:<40} {:>6}",
            m.id, date, from_trunc, subj_trunc, m.thread_id
        );
    }
    println!();
}

fn print_search_results_json(archive: &Archive, results: &[u64]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = results
        .iter()
        .filter_map(|&id| archive.corpus.message(id))
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "thread_id": m.thread_id,
                "date": m.message.sent_at.map(|d| d.to_rfc3339()),
                "from": {
                    "address": m.message.sender.address,
                    "display_name": m.message.sender.display_name,
                },
                "subject": m.message.subject,
                "message_id": m.message.message_id,
                "has_attachments": m.message.has_attachments,
            })
        })
        .collect();

    let output = serde_json::json!({
        "result_count": items.len(),
        "results": items,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
