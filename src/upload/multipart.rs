//! Multipart upload engine
//!
//! Uploads one local file as a sequence of parts with bounded concurrency
//! and commits them as a single object.
//!
//! # Flow
//!
//! 1. Plan `max(1, ceil(size / part_size))` parts
//! 2. CreateMultipartUpload
//! 3. Dispatch each part to a worker once a semaphore permit is free; the
//!    worker does a positioned read of its range and uploads it
//! 4. Sort completions by part number and CompleteMultipartUpload
//!
//! Any failed part stops further dispatch, lets in-flight parts drain and
//! aborts the remote upload. No partial commit is ever attempted.
//!
//! # Example
//!
//! ```no_run
//! use personal_s3::config::S3Config;
//! use personal_s3::s3::S3Client;
//! use personal_s3::upload::multipart::{MultipartUploader, MIN_PART_SIZE};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(&S3Config::default()).await?;
//! let uploader = MultipartUploader::new(Arc::new(client), MIN_PART_SIZE, 8)?;
//!
//! let result = uploader
//!     .upload_file("my-bucket", Path::new("/data/photos/a.jpg"), "photos/a.jpg")
//!     .await?;
//! println!("Committed {} parts, ETag {}", result.parts, result.etag);
//! # Ok(())
//! # }
//! ```

use super::parts::{plan_parts, Part};
use super::progress::ProgressTracker;
use super::{FileUploader, UploadError, UploadJob, UploadResult};
use crate::metrics;
use crate::s3::{ObjectStore, S3CompleteMultipartUploadResponse, S3CompletedPart, StorageClass};
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Minimum part size (5MB) - S3 requirement for every part but the last
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size (5GB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum parts allowed
pub const MAX_PARTS: u64 = 10_000;

/// Lifecycle of a remote multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Committed,
    Aborted,
}

/// An initiated multipart upload and the parts planned for it
///
/// Must end in [`UploadSession::commit`] or [`UploadSession::abort`], both
/// of which consume it. Dropping a session that is still open logs the
/// dangling upload id.
pub struct UploadSession {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<Part>,
    state: SessionState,
}

impl UploadSession {
    /// CreateMultipartUpload for `key` and take ownership of `parts`
    pub async fn initiate(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
        parts: Vec<Part>,
        storage_class: Option<StorageClass>,
    ) -> Result<Self, UploadError> {
        let response = store
            .create_multipart_upload(bucket, key, storage_class)
            .await?;

        tracing::info!(
            bucket = bucket,
            key = key,
            upload_id = %response.upload_id,
            parts = parts.len(),
            "Created multipart upload"
        );

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: response.upload_id,
            parts,
            state: SessionState::Open,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Attach ETags from completions that arrived in any order.
    ///
    /// Completions are sorted by part number and must be exactly `1..=N`.
    pub fn apply_completions(
        &mut self,
        mut completed: Vec<S3CompletedPart>,
    ) -> Result<(), UploadError> {
        completed.sort_by_key(|part| part.part_number);

        if completed.len() != self.parts.len() {
            return Err(UploadError::MultipartError(format!(
                "Expected {} completed parts, got {}",
                self.parts.len(),
                completed.len()
            )));
        }

        for (part, done) in self.parts.iter_mut().zip(completed) {
            if done.part_number != part.part_number {
                return Err(UploadError::MultipartError(format!(
                    "Part sequence has a gap: expected part {}, got {}",
                    part.part_number, done.part_number
                )));
            }
            part.etag = Some(done.etag);
        }

        Ok(())
    }

    /// Ordered part list for CompleteMultipartUpload
    fn commit_list(&self) -> Result<Vec<S3CompletedPart>, UploadError> {
        self.parts
            .iter()
            .map(|part| {
                part.etag
                    .clone()
                    .map(|etag| S3CompletedPart {
                        part_number: part.part_number,
                        etag,
                    })
                    .ok_or_else(|| {
                        UploadError::MultipartError(format!(
                            "Part {} has no ETag",
                            part.part_number
                        ))
                    })
            })
            .collect()
    }

    /// CompleteMultipartUpload with every part in ascending order.
    ///
    /// On failure the still-open session is handed back so it can be
    /// aborted.
    #[tracing::instrument(
        name = "upload.multipart.complete",
        skip(self),
        fields(upload_id = %self.upload_id, parts_count = self.parts.len())
    )]
    pub async fn commit(
        mut self,
    ) -> Result<S3CompleteMultipartUploadResponse, (Self, UploadError)> {
        let parts = match self.commit_list() {
            Ok(parts) => parts,
            Err(e) => return Err((self, e)),
        };

        match self
            .store
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, parts)
            .await
        {
            Ok(response) => {
                self.state = SessionState::Committed;
                tracing::info!(
                    upload_id = %self.upload_id,
                    parts = self.parts.len(),
                    "Completed multipart upload"
                );
                Ok(response)
            }
            Err(e) => Err((self, e.into())),
        }
    }

    /// AbortMultipartUpload, releasing stored parts on the server.
    ///
    /// If the request fails the session is dropped while still open, which
    /// logs the dangling upload id.
    pub async fn abort(mut self) -> Result<(), UploadError> {
        match self
            .store
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await
        {
            Ok(()) => {
                self.state = SessionState::Aborted;
                metrics::record_multipart_abort(true);
                tracing::info!(upload_id = %self.upload_id, "Aborted multipart upload");
                Ok(())
            }
            Err(e) => {
                metrics::record_multipart_abort(false);
                Err(e.into())
            }
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            tracing::warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %self.upload_id,
                "Multipart upload left open; its parts remain billable until aborted"
            );
        }
    }
}

/// Concurrent multipart uploader
pub struct MultipartUploader {
    store: Arc<dyn ObjectStore>,
    part_size: u64,
    concurrent_parts: usize,
    storage_class: Option<StorageClass>,
}

impl MultipartUploader {
    /// Create a new multipart uploader
    ///
    /// `part_size` must be at least [`MIN_PART_SIZE`]; `concurrent_parts`
    /// caps in-flight part uploads and buffered memory at
    /// `concurrent_parts × part_size`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        part_size: u64,
        concurrent_parts: usize,
    ) -> Result<Self, UploadError> {
        if part_size < MIN_PART_SIZE {
            return Err(UploadError::PartTooSmall(part_size));
        }
        if concurrent_parts == 0 {
            return Err(UploadError::MultipartError(
                "concurrent_parts must be at least 1".into(),
            ));
        }

        Ok(Self {
            store,
            part_size,
            concurrent_parts,
            storage_class: None,
        })
    }

    /// Storage class for objects created by this uploader
    pub fn with_storage_class(mut self, storage_class: Option<StorageClass>) -> Self {
        self.storage_class = storage_class;
        self
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn concurrent_parts(&self) -> usize {
        self.concurrent_parts
    }

    /// Upload `local_path` to `bucket/key`
    #[tracing::instrument(
        name = "upload.multipart",
        skip(self, local_path),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            upload.bytes = tracing::field::Empty,
            upload.parts = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_file(
        &self,
        bucket: &str,
        local_path: &Path,
        key: &str,
    ) -> Result<UploadResult, UploadError> {
        let start_time = Instant::now();
        let (file, size) = open_source(local_path).await?;

        let parts = plan_parts(size, self.part_size)?;

        let span = tracing::Span::current();
        span.record("upload.bytes", size);
        span.record("upload.parts", parts.len());

        let mut session = UploadSession::initiate(
            self.store.clone(),
            bucket,
            key,
            parts,
            self.storage_class,
        )
        .await
        .inspect_err(|_| metrics::record_multipart_upload_failure(bucket))?;

        let prepared = match self.upload_parts(&session, file, local_path).await {
            Ok(completed) => session.apply_completions(completed),
            Err(e) => Err(e),
        };
        if let Err(e) = prepared {
            metrics::record_multipart_upload_failure(bucket);
            abort_session(session, &e).await;
            return Err(e);
        }

        let parts_count = session.parts().len();
        match session.commit().await {
            Ok(response) => {
                let duration = start_time.elapsed();
                metrics::record_upload_duration(bucket, "multipart", duration.as_secs_f64());
                metrics::record_multipart_upload_success(bucket, parts_count);

                tracing::info!(
                    etag = %response.etag,
                    bytes_written = size,
                    duration_ms = duration.as_millis(),
                    "Multipart upload committed"
                );

                Ok(UploadResult {
                    etag: response.etag,
                    bytes_written: size,
                    parts: parts_count,
                })
            }
            Err((session, e)) => {
                metrics::record_multipart_upload_failure(bucket);
                abort_session(session, &e).await;
                Err(e)
            }
        }
    }

    /// Upload every planned part under the semaphore and collect the
    /// completions in whatever order they finish
    async fn upload_parts(
        &self,
        session: &UploadSession,
        file: Arc<File>,
        local_path: &Path,
    ) -> Result<Vec<S3CompletedPart>, UploadError> {
        let total_parts = session.parts().len();
        let total_bytes = session.parts().iter().map(Part::len).sum();
        let progress = Arc::new(ProgressTracker::new(
            session.key(),
            total_parts as u32,
            total_bytes,
        ));
        let semaphore = Arc::new(Semaphore::new(self.concurrent_parts));
        let failed = Arc::new(AtomicBool::new(false));
        let mut workers = JoinSet::new();

        for part in session.parts() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| UploadError::MultipartError("Part worker pool closed".into()))?;

            if failed.load(Ordering::Acquire) {
                tracing::debug!(
                    next_part = part.part_number,
                    "Part failure observed, dispatching no further parts"
                );
                break;
            }

            let worker = PartWorker {
                store: self.store.clone(),
                bucket: session.bucket().to_string(),
                key: session.key().to_string(),
                upload_id: session.upload_id().to_string(),
                file: file.clone(),
                path: local_path.to_path_buf(),
                part: part.clone(),
            };
            let failed = failed.clone();
            let progress = progress.clone();

            workers.spawn(
                async move {
                    let _permit = permit;
                    let part_number = worker.part.part_number;
                    let bytes = worker.part.len();
                    let result = worker.run().await;
                    match result {
                        Ok(_) => {
                            progress.record_part(part_number, bytes);
                        }
                        Err(_) => failed.store(true, Ordering::Release),
                    }
                    (part_number, result)
                }
                .instrument(tracing::Span::current()),
            );
        }

        let mut completed = Vec::with_capacity(total_parts);
        let mut first_failure: Option<UploadError> = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(part))) => completed.push(part),
                Ok((part_number, Err(e))) => {
                    tracing::warn!(part_number, error = %e, "Part upload failed");
                    if first_failure.is_none() {
                        first_failure = Some(UploadError::PartFailed {
                            part_number,
                            source: Box::new(e),
                        });
                    }
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Part worker did not finish");
                    if first_failure.is_none() {
                        first_failure = Some(UploadError::MultipartError(format!(
                            "Part worker did not finish: {}",
                            join_error
                        )));
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }
}

#[async_trait]
impl FileUploader for MultipartUploader {
    async fn upload(&self, bucket: &str, job: &UploadJob) -> Result<UploadResult, UploadError> {
        self.upload_file(bucket, &job.local_path, &job.remote_key)
            .await
    }
}

/// One part upload: positioned read, then UploadPart
struct PartWorker {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    file: Arc<File>,
    path: PathBuf,
    part: Part,
}

impl PartWorker {
    async fn run(self) -> Result<S3CompletedPart, UploadError> {
        let body = read_range(self.file, &self.path, self.part.start, self.part.len()).await?;
        let response = self
            .store
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                self.part.part_number,
                body,
            )
            .await?;

        Ok(S3CompletedPart {
            part_number: self.part.part_number,
            etag: response.etag,
        })
    }
}

async fn abort_session(session: UploadSession, cause: &UploadError) {
    let upload_id = session.upload_id().to_string();
    let key = session.key().to_string();
    tracing::warn!(upload_id = %upload_id, key = %key, error = %cause, "Aborting multipart upload");

    if let Err(e) = session.abort().await {
        tracing::error!(
            upload_id = %upload_id,
            key = %key,
            error = %e,
            "Failed to abort multipart upload"
        );
    }
}

async fn open_source(path: &Path) -> Result<(Arc<File>, u64), UploadError> {
    let io_error = |source| UploadError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let metadata = file.metadata().await.map_err(io_error)?;
    if !metadata.is_file() {
        return Err(io_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    Ok((Arc::new(file.into_std().await), metadata.len()))
}

/// Read `len` bytes at `offset` without touching a shared cursor
async fn read_range(
    file: Arc<File>,
    path: &Path,
    offset: u64,
    len: u64,
) -> Result<Bytes, UploadError> {
    let io_error = |source| UploadError::IoError {
        path: path.to_path_buf(),
        source,
    };
    let len = usize::try_from(len)
        .map_err(|_| io_error(io::Error::new(io::ErrorKind::InvalidInput, "part too large")))?;

    tokio::task::spawn_blocking(move || {
        let mut buffer = vec![0u8; len];
        read_exact_at(&file, &mut buffer, offset)?;
        Ok(Bytes::from(buffer))
    })
    .await
    .map_err(|e| io_error(io::Error::other(e)))?
    .map_err(io_error)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buffer, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buffer: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buffer.is_empty() {
        match file.seek_read(buffer, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buffer = &mut buffer[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::{MockObjectStore, S3ClientError, S3CreateMultipartUploadResponse};
    use std::io::Write;

    fn temp_file_with(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_part_size_below_minimum_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MockObjectStore::new());
        let result = MultipartUploader::new(store, MIN_PART_SIZE - 1, 4);
        assert!(matches!(result, Err(UploadError::PartTooSmall(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MockObjectStore::new());
        assert!(MultipartUploader::new(store, MIN_PART_SIZE, 0).is_err());
    }

    #[tokio::test]
    async fn test_positioned_reads_do_not_share_cursor() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let file = temp_file_with(&data);
        let (handle, size) = open_source(file.path()).await.unwrap();
        assert_eq!(size, 10_000);

        let tail = read_range(handle.clone(), file.path(), 9_000, 1_000).await.unwrap();
        let head = read_range(handle, file.path(), 0, 1_000).await.unwrap();

        assert_eq!(&tail[..], &data[9_000..]);
        assert_eq!(&head[..], &data[..1_000]);
    }

    #[tokio::test]
    async fn test_read_past_end_is_io_error() {
        let file = temp_file_with(b"short");
        let (handle, _) = open_source(file.path()).await.unwrap();

        let result = read_range(handle, file.path(), 0, 100).await;
        assert!(matches!(result, Err(UploadError::IoError { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_never_creates_session() {
        let mut store = MockObjectStore::new();
        store.expect_create_multipart_upload().never();
        let uploader = MultipartUploader::new(Arc::new(store), MIN_PART_SIZE, 2).unwrap();

        let result = uploader
            .upload_file("bucket", Path::new("/nonexistent/file.bin"), "file.bin")
            .await;

        assert!(matches!(result, Err(UploadError::IoError { .. })));
    }

    #[tokio::test]
    async fn test_create_failure_is_s3_error_without_abort() {
        let file = temp_file_with(b"data");
        let mut store = MockObjectStore::new();
        store.expect_create_multipart_upload().times(1).returning(|_, key, _| {
            Err(S3ClientError::RequestError {
                operation: "CreateMultipartUpload",
                key: key.to_string(),
                message: "AccessDenied".into(),
            })
        });
        store.expect_abort_multipart_upload().never();
        let uploader = MultipartUploader::new(Arc::new(store), MIN_PART_SIZE, 2).unwrap();

        let result = uploader.upload_file("bucket", file.path(), "key").await;
        assert!(matches!(result, Err(UploadError::S3Error(_))));
    }

    #[tokio::test]
    async fn test_commit_failure_aborts() {
        let file = temp_file_with(b"small object");
        let mut store = MockObjectStore::new();
        store.expect_create_multipart_upload().returning(|_, _, _| {
            Ok(S3CreateMultipartUploadResponse {
                upload_id: "upload-1".into(),
            })
        });
        store.expect_upload_part().times(1).returning(|_, _, _, _, _| {
            Ok(crate::s3::S3UploadPartResponse {
                etag: "\"etag-1\"".into(),
            })
        });
        store
            .expect_complete_multipart_upload()
            .times(1)
            .returning(|_, key, _, _| {
                Err(S3ClientError::RequestError {
                    operation: "CompleteMultipartUpload",
                    key: key.to_string(),
                    message: "InvalidPart".into(),
                })
            });
        store
            .expect_abort_multipart_upload()
            .withf(|bucket, key, upload_id| bucket == "bucket" && key == "key" && upload_id == "upload-1")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let uploader = MultipartUploader::new(Arc::new(store), MIN_PART_SIZE, 2).unwrap();

        let result = uploader.upload_file("bucket", file.path(), "key").await;
        assert!(matches!(result, Err(UploadError::S3Error(_))));
    }

    #[tokio::test]
    async fn test_apply_completions_rejects_gaps() {
        let mut store = MockObjectStore::new();
        store.expect_create_multipart_upload().returning(|_, _, _| {
            Ok(S3CreateMultipartUploadResponse {
                upload_id: "upload-1".into(),
            })
        });
        store.expect_abort_multipart_upload().returning(|_, _, _| Ok(()));
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        let mut session =
            UploadSession::initiate(store, "bucket", "key", plan_parts(3, 1).unwrap(), None)
                .await
                .unwrap();

        let result = session.apply_completions(vec![
            S3CompletedPart {
                part_number: 3,
                etag: "c".into(),
            },
            S3CompletedPart {
                part_number: 1,
                etag: "a".into(),
            },
            S3CompletedPart {
                part_number: 4,
                etag: "d".into(),
            },
        ]);
        assert!(matches!(result, Err(UploadError::MultipartError(_))));

        session.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_completions_sorts_by_part_number() {
        let mut store = MockObjectStore::new();
        store.expect_create_multipart_upload().returning(|_, _, _| {
            Ok(S3CreateMultipartUploadResponse {
                upload_id: "upload-1".into(),
            })
        });
        store.expect_abort_multipart_upload().returning(|_, _, _| Ok(()));
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        let mut session =
            UploadSession::initiate(store, "bucket", "key", plan_parts(3, 1).unwrap(), None)
                .await
                .unwrap();
        session
            .apply_completions(vec![
                S3CompletedPart {
                    part_number: 2,
                    etag: "b".into(),
                },
                S3CompletedPart {
                    part_number: 3,
                    etag: "c".into(),
                },
                S3CompletedPart {
                    part_number: 1,
                    etag: "a".into(),
                },
            ])
            .unwrap();

        let list = session.commit_list().unwrap();
        assert_eq!(
            list.iter().map(|p| (p.part_number, p.etag.as_str())).collect::<Vec<_>>(),
            vec![(1, "a"), (2, "b"), (3, "c")]
        );
        session.abort().await.unwrap();
    }
}
