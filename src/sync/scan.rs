//! Directory scanning
//!
//! Turns a directory tree into upload jobs. Keys are the root's base name
//! followed by the path relative to the root, always with `/` separators:
//! scanning `/data/photos` yields `photos/2020/a.jpg`.

use crate::upload::UploadJob;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Scan errors
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot read directory {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Collect every regular file under `root` in file-name order
#[tracing::instrument(name = "sync.scan", skip(root), fields(root = %root.as_ref().display()), err)]
pub fn scan_directory(root: impl AsRef<Path>) -> Result<Vec<UploadJob>, ScanError> {
    let root = root.as_ref();
    let root = root.canonicalize().map_err(|source| ScanError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root));
    }

    let prefix = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let mut jobs = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        // Symlinks are followed only when they point at a regular file
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let metadata = match std::fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let key = object_key(prefix.as_deref(), relative);
        jobs.push(UploadJob::new(entry.path(), key, metadata.len()));
    }

    tracing::info!(files = jobs.len(), "Scanned directory");
    Ok(jobs)
}

/// `<prefix>/<relative path>` with `/` separators
pub fn object_key(prefix: Option<&str>, relative: &Path) -> String {
    let mut segments: Vec<String> = prefix.map(str::to_string).into_iter().collect();
    segments.extend(relative.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }));
    segments.join("/")
}
