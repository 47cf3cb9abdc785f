//! personal-s3 Library
//!
//! One-way sync of a local directory tree into an S3 bucket.
//!
//! # Features
//!
//! - **Multipart Uploads**: bounded-concurrency part uploads from positioned reads
//! - **Never Half-Committed**: a failed part aborts the remote upload
//! - **Idempotent Runs**: skip by local completion cache or `HeadObject` probe
//! - **Storage Tiers**: standard through deep archive
//!
//! # Example
//!
//! ```no_run
//! use personal_s3::config::ConfigLoader;
//! use personal_s3::s3::S3Client;
//! use personal_s3::sync::{scan::scan_directory, SyncOptions, UploadScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load_or_default("personal-s3.yaml")?;
//!     let client = S3Client::new(&config.s3).await?;
//!
//!     let mut scheduler = UploadScheduler::new(Arc::new(client), SyncOptions::new("my-bucket"))?;
//!     let summary = scheduler.run(&scan_directory("/data/photos")?).await;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod sync;
pub mod upload;

// Re-export commonly used types
pub use cache::CompletionCache;
pub use config::SyncConfig;
pub use sync::{SyncSummary, UploadScheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
