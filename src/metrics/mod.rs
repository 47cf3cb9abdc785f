//! Metrics module
//!
//! Prometheus counters for a sync run. There is no scrape endpoint; the
//! registry is rendered once at the end of a run into a textfile that a
//! node exporter can pick up.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::path::Path;
use thiserror::Error;

lazy_static! {
    // Job metrics
    pub static ref JOBS_TOTAL: CounterVec = register_counter_vec!(
        "personal_s3_jobs_total",
        "Sync jobs by outcome",
        &["outcome"]
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "personal_s3_uploads_total",
        "Total number of uploads",
        &["bucket", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "personal_s3_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "personal_s3_upload_duration_seconds",
        "Upload duration in seconds",
        &["bucket", "method"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "personal_s3_multipart_uploads_total",
        "Total multipart uploads",
        &["bucket", "status"]
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "personal_s3_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref MULTIPART_ABORTS: CounterVec = register_counter_vec!(
        "personal_s3_multipart_aborts_total",
        "AbortMultipartUpload calls",
        &["status"]
    ).unwrap();

    // Cache metrics
    pub static ref CACHE_WRITE_FAILURES: Counter = register_counter!(
        "personal_s3_cache_write_failures_total",
        "Completion cache saves that failed"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "personal_s3_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Metrics textfile errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Failed to write metrics file: {0}")]
    Io(#[from] std::io::Error),
}

/// Record the outcome of one sync job ("uploaded", "skipped" or "failed")
pub fn record_job(outcome: &str) {
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a successful upload
pub fn record_upload_success(bucket: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(bucket: &str) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(bucket: &str, method: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[bucket, method])
        .observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Record a successful multipart upload
pub fn record_multipart_upload_success(bucket: &str, parts_count: usize) {
    MULTIPART_UPLOADS
        .with_label_values(&[bucket, "success"])
        .inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a failed multipart upload
pub fn record_multipart_upload_failure(bucket: &str) {
    MULTIPART_UPLOADS
        .with_label_values(&[bucket, "failure"])
        .inc();
}

pub fn record_multipart_abort(success: bool) {
    let status = if success { "success" } else { "failure" };
    MULTIPART_ABORTS.with_label_values(&[status]).inc();
}

pub fn record_cache_write_failure() {
    CACHE_WRITE_FAILURES.inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write the current metrics to `path`, replacing it atomically
pub fn write_textfile(path: &Path) -> Result<(), MetricsError> {
    let text = gather_text()?;
    let tmp_path = path.with_extension("prom.tmp");
    std::fs::write(&tmp_path, text)?;
    std::fs::rename(&tmp_path, path)?;
    tracing::debug!(path = %path.display(), "Wrote metrics textfile");
    Ok(())
}
