//! S3 Client module
//!
//! Defines the [`ObjectStore`] seam the upload engine talks to and the
//! `aws-sdk-s3` backed [`S3Client`] implementing it.
//!
//! # Operations
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PutObject | `s3.put_object` | bucket, key, bytes, storage_class |
//! | HeadObject | `s3.head_object` | bucket, key, exists |
//! | CreateMultipartUpload | `s3.create_multipart_upload` | bucket, key, upload_id |
//! | UploadPart | `s3.upload_part` | bucket, upload_id, part_number, bytes |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | bucket, upload_id, parts_count |
//! | AbortMultipartUpload | `s3.abort_multipart_upload` | bucket, upload_id |

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod client;
pub mod credentials;
pub mod storage_class;

pub use client::S3Client;
pub use storage_class::StorageClass;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credentials error: {0}")]
    CredentialsError(#[from] credentials::CredentialsError),

    #[error("{operation} failed for {key}: {message}")]
    RequestError {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Response error: {0}")]
    ResponseError(String),
}

/// S3 completed part, as sent to CompleteMultipartUpload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// S3 PutObject response
#[derive(Debug, Clone)]
pub struct S3PutObjectResponse {
    pub etag: String,
}

/// S3 CreateMultipartUpload response
#[derive(Debug, Clone)]
pub struct S3CreateMultipartUploadResponse {
    pub upload_id: String,
}

/// S3 UploadPart response
#[derive(Debug, Clone)]
pub struct S3UploadPartResponse {
    pub etag: String,
}

/// S3 CompleteMultipartUpload response
#[derive(Debug, Clone)]
pub struct S3CompleteMultipartUploadResponse {
    pub etag: String,
}

/// Remote object store operations used by the sync engine
///
/// Implementations must be safe to call concurrently: part uploads for one
/// session run in parallel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Begin a multipart upload and return its upload id
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<S3CreateMultipartUploadResponse, S3ClientError>;

    /// Upload one part of an open multipart upload
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<S3UploadPartResponse, S3ClientError>;

    /// Commit an upload. `parts` must be ascending and gapless.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<S3CompletedPart>,
    ) -> Result<S3CompleteMultipartUploadResponse, S3ClientError>;

    /// Cancel an upload and release the stored parts
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError>;

    /// Metadata-only existence probe. A missing object is `Ok(false)`.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, S3ClientError>;

    /// Single-shot write
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        storage_class: Option<StorageClass>,
    ) -> Result<S3PutObjectResponse, S3ClientError>;
}
