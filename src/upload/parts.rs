//! Part planning
//!
//! Splits `[0, size)` into contiguous, 1-based parts of `part_size` bytes,
//! the last one clipped to the file size.

use super::multipart::MAX_PARTS;
use super::UploadError;
use std::ops::Range;

/// A contiguous slice of the source file uploaded independently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
    /// Set once the part upload succeeds
    pub etag: Option<String>,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// `max(1, ceil(size / part_size))`, or `None` for a zero part size
pub fn part_count(size: u64, part_size: u64) -> Option<u64> {
    if part_size == 0 {
        return None;
    }
    Some(size.div_ceil(part_size).max(1))
}

/// Plan the parts for a file of `size` bytes.
///
/// A zero-byte file yields one empty part. Fails when `part_size` is zero or
/// the file would need more than [`MAX_PARTS`] parts.
pub fn plan_parts(size: u64, part_size: u64) -> Result<Vec<Part>, UploadError> {
    let count = part_count(size, part_size).ok_or(UploadError::PartTooSmall(part_size))?;
    if count > MAX_PARTS {
        return Err(UploadError::TooManyParts {
            size,
            part_size,
            parts: count,
        });
    }

    Ok((1..=count as u32)
        .map(|part_number| {
            let start = u64::from(part_number - 1) * part_size;
            let end = (start + part_size).min(size);
            Part {
                part_number,
                start,
                end,
                etag: None,
            }
        })
        .collect())
}
