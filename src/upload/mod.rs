//! Upload module
//!
//! Turns one local file into one committed object, either through the
//! concurrent multipart engine or a single PutObject.

use crate::s3::S3ClientError;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub mod multipart;
pub mod parts;
pub mod progress;
pub mod put_object;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("S3 error: {0}")]
    S3Error(#[from] S3ClientError),

    #[error("Part {part_number} failed: {source}")]
    PartFailed {
        part_number: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("Part size {0} bytes is below the 5MB minimum")]
    PartTooSmall(u64),

    #[error("File of {size} bytes needs {parts} parts at {part_size} bytes each (maximum 10000)")]
    TooManyParts { size: u64, part_size: u64, parts: u64 },

    #[error("Multipart upload error: {0}")]
    MultipartError(String),
}

impl UploadError {
    /// Part number of the part that broke the session, if any
    pub fn failed_part(&self) -> Option<u32> {
        match self {
            UploadError::PartFailed { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }
}

/// A file discovered for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub size_bytes: u64,
}

impl UploadJob {
    pub fn new(local_path: impl Into<PathBuf>, remote_key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            local_path: local_path.into(),
            remote_key: remote_key.into(),
            size_bytes,
        }
    }
}

/// Upload result
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub etag: String,
    pub bytes_written: u64,
    pub parts: usize,
}

/// Uploads a single job to a bucket
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, bucket: &str, job: &UploadJob) -> Result<UploadResult, UploadError>;
}
