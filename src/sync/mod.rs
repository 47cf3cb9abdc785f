//! Directory sync
//!
//! [`UploadScheduler`] walks a list of [`UploadJob`]s one at a time and, for
//! each, decides whether to skip it or upload it:
//!
//! - cache mode: skip keys recorded in the [`CompletionCache`]
//! - probe mode: skip keys for which `HeadObject` finds an object
//! - overwrite: never skip
//!
//! A failed job is logged and counted; the run always continues with the
//! next job.
//!
//! # Example
//!
//! ```no_run
//! use personal_s3::config::S3Config;
//! use personal_s3::s3::S3Client;
//! use personal_s3::sync::{scan::scan_directory, SyncOptions, UploadScheduler};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(&S3Config::default()).await?;
//! let jobs = scan_directory("/data/photos")?;
//!
//! let mut scheduler = UploadScheduler::new(Arc::new(client), SyncOptions::new("my-bucket"))?;
//! let summary = scheduler.run(&jobs).await;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod scan;

use crate::cache::CompletionCache;
use crate::metrics;
use crate::s3::{ObjectStore, StorageClass};
use crate::upload::multipart::{MultipartUploader, MIN_PART_SIZE};
use crate::upload::put_object::PutObjectUploader;
use crate::upload::{FileUploader, UploadError, UploadJob, UploadResult};
use std::fmt;
use std::sync::Arc;

/// Knobs for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub bucket: String,
    /// Upload even if the key is cached or present remotely
    pub overwrite: bool,
    pub storage_class: Option<StorageClass>,
    pub part_size: u64,
    pub concurrent_parts: usize,
    /// Files smaller than this go through a single PutObject; 0 disables
    pub multipart_threshold: u64,
}

impl SyncOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            overwrite: false,
            storage_class: None,
            part_size: MIN_PART_SIZE,
            concurrent_parts: 8,
            multipart_threshold: 0,
        }
    }
}

/// What happened to one job
#[derive(Debug)]
pub enum JobOutcome {
    Uploaded {
        result: UploadResult,
        /// False when the upload succeeded but the cache file could not be saved
        cache_saved: bool,
    },
    Skipped,
    Failed(UploadError),
}

impl JobOutcome {
    fn label(&self) -> &'static str {
        match self {
            JobOutcome::Uploaded { .. } => "uploaded",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Totals for a sync run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_uploaded: u64,
    pub cache_write_failures: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Uploaded {
                result,
                cache_saved,
            } => {
                self.uploaded += 1;
                self.bytes_uploaded += result.bytes_written;
                if !cache_saved {
                    self.cache_write_failures += 1;
                }
            }
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Total number of jobs considered
    pub fn total(&self) -> usize {
        self.uploaded + self.skipped + self.failed
    }

    /// True when no job failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded ({} bytes), {} skipped, {} failed",
            self.uploaded, self.bytes_uploaded, self.skipped, self.failed
        )?;
        if self.cache_write_failures > 0 {
            write!(f, ", {} cache write failures", self.cache_write_failures)?;
        }
        Ok(())
    }
}

/// Sequential job loop over one bucket
pub struct UploadScheduler {
    store: Arc<dyn ObjectStore>,
    multipart: MultipartUploader,
    single: PutObjectUploader,
    options: SyncOptions,
    cache: Option<CompletionCache>,
}

impl UploadScheduler {
    /// Build a scheduler in probe mode; see [`UploadScheduler::with_cache`]
    pub fn new(store: Arc<dyn ObjectStore>, options: SyncOptions) -> Result<Self, UploadError> {
        let multipart =
            MultipartUploader::new(store.clone(), options.part_size, options.concurrent_parts)?
                .with_storage_class(options.storage_class);
        let single =
            PutObjectUploader::new(store.clone()).with_storage_class(options.storage_class);

        Ok(Self {
            store,
            multipart,
            single,
            options,
            cache: None,
        })
    }

    /// Switch to cache mode: skip decisions come from `cache` and every
    /// successful upload is recorded in it
    pub fn with_cache(mut self, cache: CompletionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&CompletionCache> {
        self.cache.as_ref()
    }

    /// Hand the cache back once the run is over
    pub fn into_cache(self) -> Option<CompletionCache> {
        self.cache
    }

    /// Process every job in order
    #[tracing::instrument(
        name = "sync.run",
        skip(self, jobs),
        fields(
            s3.bucket = %self.options.bucket,
            jobs = jobs.len(),
            cache_mode = self.cache.is_some(),
            overwrite = self.options.overwrite
        )
    )]
    pub async fn run(&mut self, jobs: &[UploadJob]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for job in jobs {
            let outcome = self.process(job).await;
            metrics::record_job(outcome.label());

            match &outcome {
                JobOutcome::Uploaded { result, .. } => {
                    metrics::record_upload_success(&self.options.bucket, result.bytes_written);
                    tracing::info!(
                        key = %job.remote_key,
                        bytes = result.bytes_written,
                        parts = result.parts,
                        "Uploaded"
                    );
                }
                JobOutcome::Skipped => {
                    tracing::info!(key = %job.remote_key, "Skipped, already uploaded");
                }
                JobOutcome::Failed(e) => {
                    metrics::record_upload_failure(&self.options.bucket);
                    tracing::error!(
                        key = %job.remote_key,
                        path = %job.local_path.display(),
                        failed_part = ?e.failed_part(),
                        error = %e,
                        "Upload failed"
                    );
                }
            }

            summary.record(&outcome);
        }

        tracing::info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            bytes_uploaded = summary.bytes_uploaded,
            "Sync finished"
        );
        summary
    }

    /// Skip check, upload and cache record for one job
    pub async fn process(&mut self, job: &UploadJob) -> JobOutcome {
        if !self.options.overwrite {
            match self.already_uploaded(job).await {
                Ok(true) => return JobOutcome::Skipped,
                Ok(false) => {}
                Err(e) => return JobOutcome::Failed(e),
            }
        }

        let uploader: &dyn FileUploader = if self.uses_single_shot(job) {
            &self.single
        } else {
            &self.multipart
        };

        let result = match uploader.upload(&self.options.bucket, job).await {
            Ok(result) => result,
            Err(e) => return JobOutcome::Failed(e),
        };

        let cache_saved = match self.cache.as_mut() {
            Some(cache) => match cache.record(&job.remote_key) {
                Ok(()) => true,
                Err(e) => {
                    metrics::record_cache_write_failure();
                    tracing::warn!(
                        key = %job.remote_key,
                        error = %e,
                        "Uploaded, but the completion cache could not be saved"
                    );
                    false
                }
            },
            None => true,
        };

        JobOutcome::Uploaded {
            result,
            cache_saved,
        }
    }

    async fn already_uploaded(&self, job: &UploadJob) -> Result<bool, UploadError> {
        match &self.cache {
            Some(cache) => Ok(cache.contains(&job.remote_key)),
            None => Ok(self
                .store
                .head_object(&self.options.bucket, &job.remote_key)
                .await?),
        }
    }

    fn uses_single_shot(&self, job: &UploadJob) -> bool {
        self.options.multipart_threshold > 0 && job.size_bytes < self.options.multipart_threshold
    }
}
