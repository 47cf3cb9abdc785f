//! personal-s3 - sync a local directory into an S3 bucket
//!
//! Uploads every file under `--dir` to `--bucket`, skipping files that are
//! already there. Exits non-zero when any file failed.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use personal_s3::cache::CompletionCache;
use personal_s3::config::{ConfigLoader, SyncConfig};
use personal_s3::logging::{self, LogFormat};
use personal_s3::metrics;
use personal_s3::s3::{S3Client, StorageClass};
use personal_s3::sync::scan::scan_directory;
use personal_s3::sync::{SyncOptions, SyncSummary, UploadScheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// personal-s3 - one-way directory sync to S3 with multipart uploads
#[derive(Parser, Debug)]
#[command(name = "personal-s3")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Example: personal-s3 --bucket photos --dir ~/Pictures --cache --tier glacier-ir")]
struct Args {
    /// Destination bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Directory to sync
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Skip files recorded in the local completion cache instead of probing S3
    #[arg(long)]
    cache: bool,

    /// Upload even if the file was already uploaded
    #[arg(long)]
    overwrite: bool,

    /// Storage class for new objects
    #[arg(long, value_enum)]
    tier: Option<StorageClass>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let Some(bucket) = args.bucket.clone().filter(|b| !b.is_empty()) else {
        eprintln!("error: --bucket is required\n");
        eprintln!("{}", Args::command().render_usage());
        return ExitCode::FAILURE;
    };

    if let Err(e) = logging::init_subscriber(&args.log_level, args.log_format) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args, bucket).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Sync aborted");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, bucket: String) -> anyhow::Result<SyncSummary> {
    info!("Starting personal-s3 v{}", personal_s3::VERSION);

    let config = match &args.config {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => SyncConfig::default(),
    };

    let jobs = scan_directory(&args.dir)
        .with_context(|| format!("Failed to scan {}", args.dir.display()))?;

    let cache = if args.cache {
        let dir = config.cache.resolve_dir()?;
        let cache = CompletionCache::load(&dir, &bucket)
            .with_context(|| format!("Failed to load completion cache for {}", bucket))?;
        Some(cache)
    } else {
        None
    };

    if jobs.is_empty() {
        info!(dir = %args.dir.display(), "Nothing to upload");
        let summary = SyncSummary::default();
        println!("{}", summary);
        return Ok(summary);
    }

    let client = S3Client::new(&config.s3)
        .await
        .context("Failed to build S3 client")?;
    info!(
        region = %client.region(),
        endpoint = %client.endpoint(),
        bucket = %bucket,
        files = jobs.len(),
        "Syncing {}",
        args.dir.display()
    );

    let options = SyncOptions {
        bucket,
        overwrite: args.overwrite,
        storage_class: args.tier,
        part_size: config.upload.part_size,
        concurrent_parts: config.upload.concurrent_parts,
        multipart_threshold: config.upload.multipart_threshold,
    };
    let mut scheduler = UploadScheduler::new(Arc::new(client), options)?;
    if let Some(cache) = cache {
        scheduler = scheduler.with_cache(cache);
    }

    let summary = scheduler.run(&jobs).await;
    println!("{}", summary);

    if let Some(path) = &config.metrics.textfile {
        if let Err(e) = metrics::write_textfile(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }

    Ok(summary)
}
