//! Shared test helpers
//!
//! [`FakeObjectStore`] is an in-memory [`ObjectStore`] that records every
//! call, can delay or fail individual parts, and tracks how many part
//! uploads run at the same time.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use personal_s3::s3::{
    ObjectStore, S3ClientError, S3CompleteMultipartUploadResponse, S3CompletedPart,
    S3CreateMultipartUploadResponse, S3PutObjectResponse, S3UploadPartResponse, StorageClass,
};
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MB: u64 = 1024 * 1024;

/// One recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { key: String },
    UploadPart { key: String, part_number: u32, len: usize },
    Complete { key: String, parts: Vec<u32> },
    Abort { key: String, upload_id: String },
    Head { key: String },
    Put { key: String, len: usize },
}

/// An object that was committed
#[derive(Debug, Clone)]
pub struct CommittedObject {
    pub parts: Vec<S3CompletedPart>,
    pub data: Vec<u8>,
    pub storage_class: Option<StorageClass>,
}

#[derive(Debug, Default)]
struct OpenUpload {
    key: String,
    storage_class: Option<StorageClass>,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_upload: usize,
    calls: Vec<Call>,
    open: HashMap<String, OpenUpload>,
    committed: HashMap<String, CommittedObject>,
    aborted: Vec<String>,
    completion_order: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct FakeObjectStore {
    state: Mutex<FakeState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    part_delays: HashMap<u32, Duration>,
    failing_parts: HashSet<(String, u32)>,
    existing: HashSet<String>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every part with this number before it completes
    pub fn with_part_delay(mut self, part_number: u32, delay: Duration) -> Self {
        self.part_delays.insert(part_number, delay);
        self
    }

    /// Make UploadPart fail for this key and part number
    pub fn with_failing_part(mut self, key: &str, part_number: u32) -> Self {
        self.failing_parts.insert((key.to_string(), part_number));
        self
    }

    /// Report this key as present to HeadObject
    pub fn with_existing(mut self, key: &str) -> Self {
        self.existing.insert(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that create or change remote objects
    pub fn upload_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, Call::Head { .. }))
            .count()
    }

    pub fn committed(&self, key: &str) -> Option<CommittedObject> {
        self.state.lock().unwrap().committed.get(key).cloned()
    }

    pub fn committed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().unwrap().committed.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    /// Part numbers in the order their uploads finished
    pub fn completion_order(&self) -> Vec<u32> {
        self.state.lock().unwrap().completion_order.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn request_error(operation: &'static str, key: &str, message: &str) -> S3ClientError {
    S3ClientError::RequestError {
        operation,
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        storage_class: Option<StorageClass>,
    ) -> Result<S3CreateMultipartUploadResponse, S3ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create {
            key: key.to_string(),
        });
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.open.insert(
            upload_id.clone(),
            OpenUpload {
                key: key.to_string(),
                storage_class,
                parts: BTreeMap::new(),
            },
        );
        Ok(S3CreateMultipartUploadResponse { upload_id })
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<S3UploadPartResponse, S3ClientError> {
        self.record(Call::UploadPart {
            key: key.to_string(),
            part_number,
            len: body.len(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.part_delays.get(&part_number) {
            tokio::time::sleep(*delay).await;
        }

        let result = if self.failing_parts.contains(&(key.to_string(), part_number)) {
            Err(request_error("UploadPart", key, "connection reset by peer"))
        } else {
            let etag = format!("\"{}-{}\"", upload_id, part_number);
            let mut state = self.state.lock().unwrap();
            match state.open.get_mut(upload_id) {
                Some(upload) => {
                    upload.parts.insert(part_number, (etag.clone(), body));
                    state.completion_order.push(part_number);
                    Ok(S3UploadPartResponse { etag })
                }
                None => Err(request_error("UploadPart", key, "NoSuchUpload")),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<S3CompletedPart>,
    ) -> Result<S3CompleteMultipartUploadResponse, S3ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Complete {
            key: key.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });

        let upload = state
            .open
            .remove(upload_id)
            .ok_or_else(|| request_error("CompleteMultipartUpload", key, "NoSuchUpload"))?;

        let mut data = Vec::new();
        for part in &parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, body)) if *etag == part.etag => data.extend_from_slice(body),
                _ => return Err(request_error("CompleteMultipartUpload", key, "InvalidPart")),
            }
        }

        state.committed.insert(
            upload.key,
            CommittedObject {
                parts,
                data,
                storage_class: upload.storage_class,
            },
        );
        Ok(S3CompleteMultipartUploadResponse {
            etag: format!("\"{}-final\"", upload_id),
        })
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Abort {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });
        state.open.remove(upload_id);
        state.aborted.push(upload_id.to_string());
        Ok(())
    }

    async fn head_object(&self, _bucket: &str, key: &str) -> Result<bool, S3ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Head {
            key: key.to_string(),
        });
        Ok(self.existing.contains(key) || state.committed.contains_key(key))
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        body: Bytes,
        storage_class: Option<StorageClass>,
    ) -> Result<S3PutObjectResponse, S3ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Put {
            key: key.to_string(),
            len: body.len(),
        });
        state.committed.insert(
            key.to_string(),
            CommittedObject {
                parts: Vec::new(),
                data: body.to_vec(),
                storage_class,
            },
        );
        Ok(S3PutObjectResponse {
            etag: "\"put\"".into(),
        })
    }
}

/// Write `len` random bytes to `dir/name` and return them
pub fn write_random_file(dir: &Path, name: &str, len: u64) -> Vec<u8> {
    let mut data = vec![0u8; len as usize];
    rand::rng().fill(&mut data[..]);
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, &data).unwrap();
    data
}
