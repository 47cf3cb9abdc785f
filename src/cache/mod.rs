//! Completion cache
//!
//! Durable set of object keys this tool has committed to a bucket. One JSON
//! file per bucket lives in the cache directory:
//!
//! ```text
//! ~/.personal-s3/my-bucket
//! {
//!   "photos/2020/a.jpg": {},
//!   "photos/2020/b.jpg": {}
//! }
//! ```
//!
//! Every [`CompletionCache::record`] rewrites the file (write-through), so a
//! crash loses at most the upload that was in flight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache namespace '{0}': must be a non-empty bucket name without path separators or a leading '.'")]
    InvalidNamespace(String),

    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Empty marker stored against each uploaded key; serializes as `{}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uploaded {}

/// Set of keys known to be fully uploaded to one bucket
#[derive(Debug)]
pub struct CompletionCache {
    namespace: String,
    path: PathBuf,
    entries: BTreeMap<String, Uploaded>,
}

impl CompletionCache {
    /// Load the cache for `namespace` from `dir`, creating an empty one if
    /// no prior state exists
    #[tracing::instrument(name = "cache.load", skip(dir), fields(cache.dir = %dir.as_ref().display()), err)]
    pub fn load(dir: impl AsRef<Path>, namespace: &str) -> Result<Self, CacheError> {
        validate_namespace(namespace)?;
        let dir = dir.as_ref();
        let path = dir.join(namespace);

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
            tracing::info!(dir = %dir.display(), "Created cache directory");
        }

        if !path.exists() {
            let cache = Self {
                namespace: namespace.to_string(),
                path,
                entries: BTreeMap::new(),
            };
            cache.save()?;
            tracing::info!(path = %cache.path.display(), "Created empty completion cache");
            return Ok(cache);
        }

        let file = File::open(&path).map_err(|e| CacheError::io(&path, e))?;
        let entries: BTreeMap<String, Uploaded> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded completion cache"
        );

        Ok(Self {
            namespace: namespace.to_string(),
            path,
            entries,
        })
    }

    /// Bucket namespace this cache belongs to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Location of the persisted cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Mark `key` as uploaded and persist the whole set.
    ///
    /// On a save error the key stays recorded in memory; the file keeps its
    /// previous contents.
    pub fn record(&mut self, key: &str) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Uploaded {});
        self.save()
    }

    /// Write the full set to disk via a temp file and rename
    pub fn save(&self) -> Result<(), CacheError> {
        let tmp_path = self.path.with_file_name(temp_file_name(&self.namespace));

        let file = File::create(&tmp_path).map_err(|e| CacheError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.entries).map_err(|source| {
            CacheError::Serialize {
                path: tmp_path.clone(),
                source,
            }
        })?;
        writer
            .write_all(b"\n")
            .map_err(|e| CacheError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| CacheError::io(&tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| CacheError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| CacheError::io(&self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "Persisted completion cache"
        );
        Ok(())
    }
}

/// Staging file for [`CompletionCache::save`]. Bucket names never start
/// with `.`, so this cannot collide with another bucket's cache file.
fn temp_file_name(namespace: &str) -> String {
    format!(".{}.tmp", namespace)
}

fn validate_namespace(namespace: &str) -> Result<(), CacheError> {
    let invalid =
        namespace.is_empty() || namespace.starts_with('.') || namespace.contains(['/', '\\']);
    if invalid {
        return Err(CacheError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}
