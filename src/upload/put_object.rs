//! PutObject uploader
//!
//! Uploads small files (below the configured multipart threshold) with a
//! single PutObject request.
//!
//! # Example
//!
//! ```no_run
//! use personal_s3::config::S3Config;
//! use personal_s3::s3::S3Client;
//! use personal_s3::upload::put_object::PutObjectUploader;
//! use personal_s3::upload::{FileUploader, UploadJob};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(&S3Config::default()).await?;
//! let uploader = PutObjectUploader::new(Arc::new(client));
//!
//! let job = UploadJob::new("/data/notes/todo.txt", "notes/todo.txt", 42);
//! let result = uploader.upload("my-bucket", &job).await?;
//! println!("Uploaded with ETag: {}", result.etag);
//! # Ok(())
//! # }
//! ```

use super::{FileUploader, UploadError, UploadJob, UploadResult};
use crate::metrics;
use crate::s3::{ObjectStore, StorageClass};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Single-request uploader
pub struct PutObjectUploader {
    store: Arc<dyn ObjectStore>,
    storage_class: Option<StorageClass>,
}

impl PutObjectUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            storage_class: None,
        }
    }

    pub fn with_storage_class(mut self, storage_class: Option<StorageClass>) -> Self {
        self.storage_class = storage_class;
        self
    }
}

#[async_trait]
impl FileUploader for PutObjectUploader {
    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, job),
        fields(
            s3.bucket = %bucket,
            s3.key = %job.remote_key,
            upload.bytes = job.size_bytes,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn upload(&self, bucket: &str, job: &UploadJob) -> Result<UploadResult, UploadError> {
        let start_time = Instant::now();

        let body = tokio::fs::read(&job.local_path)
            .await
            .map_err(|source| UploadError::IoError {
                path: job.local_path.clone(),
                source,
            })?;
        let bytes_written = body.len() as u64;

        let result = self
            .store
            .put_object(bucket, &job.remote_key, Bytes::from(body), self.storage_class)
            .await;

        let duration = start_time.elapsed();
        metrics::record_upload_duration(bucket, "put_object", duration.as_secs_f64());

        match result {
            Ok(response) => {
                tracing::Span::current().record("s3.etag", response.etag.as_str());
                tracing::info!(
                    etag = %response.etag,
                    bytes_written,
                    duration_ms = duration.as_millis(),
                    "PutObject upload completed"
                );

                Ok(UploadResult {
                    etag: response.etag,
                    bytes_written,
                    parts: 1,
                })
            }
            Err(e) => {
                metrics::record_error("s3_put_object");
                tracing::error!(
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "PutObject upload failed"
                );
                Err(e.into())
            }
        }
    }
}
