//! Command-line interface for reclift.
//!
//! Provides commands for ingesting a volume, watching for volumes, previewing
//! groupings, merging explicit files and reviewing past jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use crate::adapters::FfmpegCodec;
use crate::config::{self, ResolvedConfig};
use crate::core::{
    group_recordings, AudioConsolidator, IngestError, IngestionPipeline, JobJournal, JobObserver,
    JobSummary, JobUpdate, TransferExecutor,
};
use crate::domain::{JobOutcome, OutputFormat, ProcessingOptions, SourceFile, TransferResult};
use crate::ingest::{VolumeScanner, VolumeWatcher, VolumeWatcherConfig};

/// reclift - Ingest, reassemble and consolidate recorder audio
#[derive(Parser, Debug)]
#[command(name = "reclift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the recordings on a mounted volume
    Ingest {
        /// Volume root to ingest from
        volume: PathBuf,

        /// Destination folder (overrides config)
        #[arg(short, long, env = "RECLIFT_DESTINATION")]
        destination: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Keep split fragments as separate files
        #[arg(long)]
        no_merge: bool,

        /// Do not delete recordings below the size threshold
        #[arg(long)]
        keep_small: bool,

        /// Small-file threshold in bytes
        #[arg(long)]
        threshold: Option<u64>,

        /// Leave the original files on the volume
        #[arg(long)]
        preserve_originals: bool,
    },

    /// Watch for mounted volumes and ingest each one
    Watch {
        /// Directory volumes are mounted under (overrides config)
        #[arg(long)]
        volumes_dir: Option<PathBuf>,

        /// Destination folder (overrides config)
        #[arg(short, long, env = "RECLIFT_DESTINATION")]
        destination: Option<PathBuf>,
    },

    /// Show how the recordings in a directory would be grouped
    Group {
        /// Directory to scan
        dir: PathBuf,
    },

    /// Consolidate explicit files into the output directory
    Merge {
        /// Files to consolidate
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },

    /// List past ingestion jobs
    History {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Output format for CLI (maps to OutputFormat)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Lossless PCM in a WAV container
    Wav,

    /// AAC in an .m4a container
    Aac,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Wav => OutputFormat::Wav,
            FormatArg::Aac => OutputFormat::Aac,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load_config()?;

        match self.command {
            Commands::Ingest {
                volume,
                destination,
                format,
                no_merge,
                keep_small,
                threshold,
                preserve_originals,
            } => {
                let mut options = cfg.processing.clone();
                if let Some(format) = format {
                    options.output_format = format.into();
                }
                if no_merge {
                    options.merge_enabled = false;
                }
                if keep_small {
                    options.delete_small_files = false;
                }
                if let Some(threshold) = threshold {
                    options.small_file_threshold_bytes = threshold;
                }
                if preserve_originals {
                    options.preserve_originals = true;
                }

                ingest_volume(&cfg, &volume, destination, options).await
            }
            Commands::Watch {
                volumes_dir,
                destination,
            } => watch_volumes(&cfg, volumes_dir, destination).await,
            Commands::Group { dir } => show_groups(&cfg, &dir).await,
            Commands::Merge {
                files,
                output,
                format,
            } => merge_files(&cfg, files, &output, format).await,
            Commands::History { limit } => show_history(&cfg, limit).await,
            Commands::Config => show_config(&cfg),
        }
    }
}

/// Wire up a pipeline from configuration
fn build_pipeline(
    cfg: &ResolvedConfig,
    destination: &Path,
    options: ProcessingOptions,
) -> IngestionPipeline {
    let consolidator = AudioConsolidator::new(Arc::new(FfmpegCodec::new()));
    let executor = TransferExecutor::new(consolidator, cfg.grouping.clone(), cfg.transfer.clone());

    let pipeline = IngestionPipeline::new(executor, destination, options)
        .with_lock_file(cfg.lock_path());

    match JobJournal::open(cfg.journal_path()) {
        Ok(journal) => pipeline.with_journal(journal),
        Err(e) => {
            tracing::warn!("Job journal unavailable: {}", e);
            pipeline
        }
    }
}

fn resolve_destination(cfg: &ResolvedConfig, flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(dest) => Ok(dest),
        None => Ok(cfg.destination()?.to_path_buf()),
    }
}

/// Ingest one volume
async fn ingest_volume(
    cfg: &ResolvedConfig,
    volume: &Path,
    destination: Option<PathBuf>,
    options: ProcessingOptions,
) -> Result<()> {
    let destination = resolve_destination(cfg, destination)?;
    let pipeline = build_pipeline(cfg, &destination, options);

    println!("📂 Ingesting: {}", volume.display());
    println!("   Destination: {}", destination.display());
    println!();

    let summary = run_job(&pipeline, volume).await?;
    print_summary(&summary);

    Ok(())
}

/// Run one job, printing updates as they arrive
async fn run_job(pipeline: &IngestionPipeline, volume: &Path) -> Result<JobSummary> {
    let (mut observer, rx) = JobObserver::channel();
    let printer = tokio::spawn(print_updates(rx));

    let result = pipeline.run(volume, &mut observer).await;

    // Observer is closed by the pipeline; the printer drains and exits
    drop(observer);
    printer.await.ok();

    result.with_context(|| format!("Ingestion of {} failed", volume.display()))
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        match update {
            JobUpdate::State(state) => tracing::debug!("State: {}", state),
            JobUpdate::Progress { label, fraction } => {
                println!("   [{:>3.0}%] {}", fraction * 100.0, label);
            }
            JobUpdate::Event(event) => println!("• {}", event.summary),
        }
    }
}

fn print_summary(summary: &JobSummary) {
    let TransferResult {
        transferred,
        processed,
        merged,
        deleted_small,
        skipped,
        errored,
    } = summary.report.result;

    println!();
    println!("Job {}", summary.job_id);
    println!("══════════════════════════════════════════════════════════════");
    println!("  Transferred:    {}", transferred);
    println!("  Processed:      {}", processed);
    println!("  Merged:         {}", merged);
    println!("  Deleted small:  {}", deleted_small);
    println!("  Skipped:        {}", skipped);
    println!("  Errored:        {}", errored);

    if !summary.report.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &summary.report.failures {
            println!("  ❌ {}: {}", failure.path.display(), failure.error);
        }
    }

    println!();
    if summary.report.result.is_empty() {
        println!("ℹ️  No recordings found");
    } else if skipped + errored == 0 {
        println!("✅ Done");
    } else {
        println!("⚠️  Finished with {} file(s) left on the volume", skipped + errored);
    }
}

/// Watch for volumes and ingest them one at a time
async fn watch_volumes(
    cfg: &ResolvedConfig,
    volumes_dir: Option<PathBuf>,
    destination: Option<PathBuf>,
) -> Result<()> {
    let destination = resolve_destination(cfg, destination)?;
    let volumes_dir = volumes_dir.unwrap_or_else(|| cfg.volumes_dir.clone());

    let pipeline = build_pipeline(cfg, &destination, cfg.processing.clone());
    let watcher = VolumeWatcher::new(VolumeWatcherConfig::new(&volumes_dir));

    println!("👁️  Watching: {}", volumes_dir.display());
    println!("    Destination: {}", destination.display());
    println!("    Press Ctrl+C to stop");
    println!();

    let (mut event_rx, handle) = watcher.watch()?;

    // Set up Ctrl+C handler
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = stop_tx.send(());
    });

    // Volumes that mount mid-job wait in the channel
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                println!("💾 Volume mounted: {}", event.root.display());
                match run_job(&pipeline, &event.root).await {
                    Ok(summary) => print_summary(&summary),
                    Err(e) => println!("❌ {:#}", e),
                }
                println!();
            }
            _ = &mut stop_rx => {
                println!();
                println!("🛑 Stopping watcher...");
                handle.stop().await?;
                break;
            }
        }
    }

    Ok(())
}

/// Dry run of the classifier over a directory
async fn show_groups(cfg: &ResolvedConfig, dir: &Path) -> Result<()> {
    let scanner = VolumeScanner::new(cfg.grouping.raw_extension.clone(), &cfg.transfer.exclude_patterns);
    let files = scanner.scan_async(dir).await?;

    if files.is_empty() {
        println!("No recordings found");
        return Ok(());
    }

    let groups = group_recordings(&files, &cfg.grouping);
    let extension = cfg.processing.output_format.extension();

    println!("{:<40} {:>7} {:>12}  {}", "OUTPUT", "FILES", "SIZE", "MEMBERS");
    println!("{}", "-".repeat(90));

    for group in &groups {
        let members: Vec<&str> = group.members().iter().map(|m| m.file_name.as_str()).collect();
        println!(
            "{:<40} {:>7} {:>12}  {}",
            group.output_file_name(extension),
            group.len(),
            group.total_size(),
            members.join(", ")
        );
    }

    println!();
    println!(
        "{} file(s) → {} recording(s), {} merge(s)",
        files.len(),
        groups.len(),
        groups.iter().filter(|g| g.is_merge()).count()
    );

    Ok(())
}

/// Consolidate explicit files; originals are kept
async fn merge_files(
    cfg: &ResolvedConfig,
    paths: Vec<PathBuf>,
    output: &Path,
    format: Option<FormatArg>,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match SourceFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    let groups = group_recordings(&files, &cfg.grouping);
    if groups.is_empty() {
        return Err(IngestError::NoFilesToProcess.into());
    }

    let mut options = cfg.processing.clone();
    options.preserve_originals = true;
    if let Some(format) = format {
        options.output_format = format.into();
    }

    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    let consolidator = AudioConsolidator::new(Arc::new(FfmpegCodec::new()));
    let mut failed = 0;

    for group in &groups {
        match consolidator.consolidate(group, output, &options).await {
            Ok(out) => println!("✅ {} ({} file(s))", out.path.display(), out.members),
            Err(e) => {
                failed += 1;
                println!("❌ {}: {}", group.base_name(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} recording(s) failed", failed, groups.len());
    }

    Ok(())
}

/// List jobs from the journal
async fn show_history(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let journal = JobJournal::open(cfg.journal_path())?;
    let jobs = journal.jobs().await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<10} {:>6} {:>6} {:>6}  {}",
        "JOB ID", "STARTED", "OUTCOME", "COPIED", "OUT", "MERGED", "VOLUME"
    );
    println!("{}", "-".repeat(110));

    for job in jobs.into_iter().take(limit) {
        let outcome = match &job.outcome {
            JobOutcome::Running => "running",
            JobOutcome::Completed => "completed",
            JobOutcome::Failed { .. } => "failed",
        };
        println!(
            "{:<38} {:<20} {:<10} {:>6} {:>6} {:>6}  {}",
            job.id,
            job.started_at.format("%Y-%m-%d %H:%M:%S"),
            outcome,
            job.transferred,
            job.processed,
            job.merged,
            job.volume
                .as_ref()
                .map(|v| v.display().to_string())
                .unwrap_or_default()
        );
        if let JobOutcome::Failed { error } = &job.outcome {
            println!("    ↳ {}", error);
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  reclift Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (state):  {}", cfg.home.display());
    println!(
        "  Destination:   {}",
        cfg.destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  Volumes:       {}", cfg.volumes_dir.display());
    println!("  Journal:       {}", cfg.journal_path().display());
    println!();
    println!("Processing:");
    println!("  Merge fragments:     {}", cfg.processing.merge_enabled);
    println!("  Delete small files:  {}", cfg.processing.delete_small_files);
    println!("  Small-file threshold: {} bytes", cfg.processing.small_file_threshold_bytes);
    println!("  Output format:       {}", cfg.processing.output_format);
    println!("  Preserve originals:  {}", cfg.processing.preserve_originals);
    println!();
    println!("Grouping:");
    println!("  Raw extension:       .{}", cfg.grouping.raw_extension);
    println!("  Large-file threshold: {} bytes", cfg.grouping.large_file_threshold_bytes);
    println!("  Proximity window:    {}s", cfg.grouping.proximity_window_secs);
    println!("  Vendor tokens:       {}", cfg.grouping.vendor_tokens.join(", "));
    println!();
    println!("Transfer:");
    println!("  Verify checksums:    {}", cfg.transfer.verify_checksums);
    println!("  Verify delay:        {}ms", cfg.transfer.verify_delay_ms);
    if !cfg.transfer.exclude_patterns.is_empty() {
        println!("  Exclude:             {}", cfg.transfer.exclude_patterns.join(", "));
    }

    Ok(())
}
