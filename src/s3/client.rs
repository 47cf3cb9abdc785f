//! AWS SDK backed [`ObjectStore`] implementation
//!
//! # Example
//!
//! ```no_run
//! use personal_s3::config::S3Config;
//! use personal_s3::s3::{ObjectStore, S3Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3Config {
//!     region: Some("us-east-1".to_string()),
//!     ..Default::default()
//! };
//! let client = S3Client::new(&config).await?;
//!
//! if !client.head_object("my-bucket", "photos/a.jpg").await? {
//!     println!("not uploaded yet");
//! }
//! # Ok(())
//! # }
//! ```

use super::credentials::CredentialsProvider;
use super::{
    ObjectStore, S3ClientError, S3CompleteMultipartUploadResponse, S3CompletedPart,
    S3CreateMultipartUploadResponse, S3PutObjectResponse, S3UploadPartResponse, StorageClass,
};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;

/// S3 Client
#[derive(Clone, Debug)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    region: String,
    endpoint: Option<String>,
}

impl S3Client {
    /// Create a new S3 client
    ///
    /// Static credentials and region from `config` take precedence over the
    /// AWS default provider chain. A custom endpoint switches to path-style
    /// addressing so S3-compatible servers (MinIO, RustFS, R2) work.
    pub async fn new(config: &S3Config) -> Result<Self, S3ClientError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(credentials) = CredentialsProvider::from_config(config)? {
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| {
                S3ClientError::ConfigError(
                    "No AWS region configured: set s3.region or AWS_REGION".into(),
                )
            })?;

        if sdk_config.credentials_provider().is_none() {
            return Err(S3ClientError::ConfigError(
                "No AWS credentials provider available".into(),
            ));
        }

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::debug!(
            region = %region,
            endpoint = ?config.endpoint,
            "S3 client configured"
        );

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            region,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Wrap a pre-built SDK client
    pub fn from_sdk_client(client: aws_sdk_s3::Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
            endpoint: None,
        }
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

fn request_error<E>(operation: &'static str, key: &str, err: E) -> S3ClientError
where
    E: std::error::Error + 'static,
{
    S3ClientError::RequestError {
        operation,
        key: key.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

fn to_sdk_part_number(part_number: u32) -> Result<i32, S3ClientError> {
    i32::try_from(part_number).map_err(|_| {
        S3ClientError::ConfigError(format!("Part number {} out of range", part_number))
    })
}

#[async_trait]
impl ObjectStore for S3Client {
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.upload_id = tracing::field::Empty
        ),
        err
    )]
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<S3CreateMultipartUploadResponse, S3ClientError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_storage_class(storage_class.map(Into::into))
            .send()
            .await
            .map_err(|e| request_error("CreateMultipartUpload", key, e))?;

        let upload_id = output
            .upload_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                S3ClientError::ResponseError(format!(
                    "CreateMultipartUpload for {} returned no UploadId",
                    key
                ))
            })?
            .to_string();

        tracing::Span::current().record("s3.upload_id", upload_id.as_str());

        Ok(S3CreateMultipartUploadResponse { upload_id })
    }

    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, body),
        fields(
            s3.bucket = %bucket,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            upload.bytes = body.len()
        ),
        err
    )]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<S3UploadPartResponse, S3ClientError> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(to_sdk_part_number(part_number)?)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| request_error("UploadPart", key, e))?;

        let etag = output.e_tag().ok_or_else(|| {
            S3ClientError::ResponseError(format!(
                "UploadPart {} for {} returned no ETag",
                part_number, key
            ))
        })?;

        Ok(S3UploadPartResponse {
            etag: etag.to_string(),
        })
    }

    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, parts),
        fields(
            s3.bucket = %bucket,
            s3.upload_id = %upload_id,
            parts_count = parts.len()
        ),
        err
    )]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<S3CompletedPart>,
    ) -> Result<S3CompleteMultipartUploadResponse, S3ClientError> {
        let mut sdk_parts = Vec::with_capacity(parts.len());
        for part in parts {
            sdk_parts.push(
                CompletedPart::builder()
                    .part_number(to_sdk_part_number(part.part_number)?)
                    .e_tag(part.etag)
                    .build(),
            );
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(sdk_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| request_error("CompleteMultipartUpload", key, e))?;

        Ok(S3CompleteMultipartUploadResponse {
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self),
        fields(s3.bucket = %bucket, s3.upload_id = %upload_id),
        err
    )]
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| request_error("AbortMultipartUpload", key, e))?;
        Ok(())
    }

    #[tracing::instrument(
        name = "s3.head_object",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key, s3.exists = tracing::field::Empty),
        err
    )]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, S3ClientError> {
        let exists = match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => true,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if !not_found {
                    return Err(request_error("HeadObject", key, err));
                }
                false
            }
        };

        tracing::Span::current().record("s3.exists", exists);
        Ok(exists)
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            upload.bytes = body.len(),
            s3.storage_class = ?storage_class
        ),
        err
    )]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        storage_class: Option<StorageClass>,
    ) -> Result<S3PutObjectResponse, S3ClientError> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_storage_class(storage_class.map(Into::into))
            .send()
            .await
            .map_err(|e| request_error("PutObject", key, e))?;

        Ok(S3PutObjectResponse {
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }
}
