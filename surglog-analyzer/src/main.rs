//! surglog - surgical-robot log decoder and surgery analyzer
//!
//! Reads one or more encrypted controller logs and prints decoded events,
//! reconstructed surgeries or storage rows as JSON on stdout. Logs go to
//! stderr (or the configured log file).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use surglog_analyzer::{LogPipeline, PipelineOptions, PipelineReport};
use surglog_common::config::{self, TomlConfig, ENV_DEVICE_ID, ENV_KEY};
use surglog_common::human_time::format_duration_opt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for surglog
#[derive(Parser, Debug)]
#[command(name = "surglog")]
#[command(about = "Decode surgical-robot logs and reconstruct surgeries")]
#[command(version)]
struct Args {
    /// Config file (default: $SURGLOG_CONFIG, then ~/.config/surglog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Device decrypt key (XX-XX-XX-XX-XX-XX)
    #[arg(short, long, global = true)]
    key: Option<String>,

    /// Device identifier for projected surgery ids
    #[arg(short, long, global = true)]
    device_id: Option<String>,

    /// Explanation catalog (TOML)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print decoded events
    Decode { files: Vec<PathBuf> },
    /// Print reconstructed surgeries
    Analyze { files: Vec<PathBuf> },
    /// Print storage rows
    Project { files: Vec<PathBuf> },
    /// Write a config file with the built-in defaults
    InitConfig {
        /// Target path (default: ~/.config/surglog/config.toml)
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    source: &'a str,
    stats: &'a surglog_analyzer::decode::DecodeStats,
    events: &'a [surglog_analyzer::DecodedEvent],
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    source: &'a str,
    stats: &'a surglog_analyzer::decode::DecodeStats,
    surgeries: &'a [surglog_analyzer::Surgery],
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config before tracing: the log level and file come from it
    let toml_config = config::load_or_default(args.config.as_deref())
        .context("Failed to load config file")?;
    init_tracing(&args, &toml_config)?;

    info!(
        "Starting surglog v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let files = match &args.command {
        Command::InitConfig { path, force } => return init_config(path.as_deref(), *force),
        Command::Decode { files } | Command::Analyze { files } | Command::Project { files } => {
            files.clone()
        }
    };
    if files.is_empty() {
        bail!("No input files given");
    }

    let options = PipelineOptions {
        key: config::resolve_value(args.key.as_deref(), ENV_KEY, toml_config.key.as_deref()),
        fallback_key: toml_config.fallback_key_or_default().to_string(),
        explanation_catalog: args.catalog.clone().or(toml_config.explanation_catalog.clone()),
        device_id: config::resolve_value(
            args.device_id.as_deref(),
            ENV_DEVICE_ID,
            toml_config.device_id.as_deref(),
        ),
    };
    if options.key.is_none() {
        warn!("No device key configured, only the fallback key will be tried");
    }

    let pipeline = Arc::new(
        LogPipeline::from_options(&options).context("Failed to initialize pipeline")?,
    );
    let reports = process_files(&pipeline, files).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &args.command {
        Command::Decode { .. } => {
            let output: Vec<DecodeOutput> = reports
                .iter()
                .map(|r| DecodeOutput {
                    source: &r.source,
                    stats: &r.stats,
                    events: &r.events,
                })
                .collect();
            serde_json::to_writer_pretty(&mut out, &output)?;
        }
        Command::Analyze { .. } => {
            log_summary(&reports);
            let output: Vec<AnalyzeOutput> = reports
                .iter()
                .map(|r| AnalyzeOutput {
                    source: &r.source,
                    stats: &r.stats,
                    surgeries: &r.surgeries,
                })
                .collect();
            serde_json::to_writer_pretty(&mut out, &output)?;
        }
        Command::Project { .. } => {
            log_summary(&reports);
            let rows: Vec<_> = reports.iter().flat_map(|r| pipeline.rows(r)).collect();
            serde_json::to_writer_pretty(&mut out, &rows)?;
        }
        Command::InitConfig { .. } => {}
    }
    writeln!(out)?;
    Ok(())
}

fn init_tracing(args: &Args, toml_config: &TomlConfig) -> Result<()> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&toml_config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &toml_config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// One blocking task per file; reports come back in input order.
///
/// Files that fail are logged and skipped. Fails only if every file failed.
async fn process_files(pipeline: &Arc<LogPipeline>, files: Vec<PathBuf>) -> Result<Vec<PipelineReport>> {
    let total = files.len();
    let handles: Vec<_> = files
        .into_iter()
        .map(|path| {
            let pipeline = Arc::clone(pipeline);
            tokio::task::spawn_blocking(move || pipeline.process_file(&path))
        })
        .collect();

    let mut reports = Vec::with_capacity(total);
    for handle in handles {
        match handle.await.context("File task panicked")? {
            Ok(report) => reports.push(report),
            Err(e) => error!("{}", e),
        }
    }

    if reports.is_empty() {
        bail!("None of {} files could be processed", total);
    }
    if reports.len() < total {
        warn!("{} of {} files skipped", total - reports.len(), total);
    }
    Ok(reports)
}

fn log_summary(reports: &[PipelineReport]) {
    for report in reports {
        for surgery in &report.surgeries {
            let minutes = surgery.total_duration_minutes;
            info!(
                "{} {}: {} sessions, {} alarms, {}{}",
                report.source,
                surgery.surgery_id,
                surgery.session_count(),
                surgery.alarm_details.len(),
                format_duration_opt(minutes.map(|m| m * 60)),
                if surgery.is_abnormal_shutdown { " (abnormal shutdown)" } else { "" }
            );
        }
    }
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config::default_config_path()
            .context("No platform config directory; pass a path")?,
    };
    if target.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", target.display());
    }

    let defaults = TomlConfig {
        fallback_key: Some(config::DEFAULT_FALLBACK_KEY.to_string()),
        ..TomlConfig::default()
    };
    config::write_toml_config(&defaults, &target)?;
    info!("Wrote default config to {}", target.display());
    Ok(())
}
