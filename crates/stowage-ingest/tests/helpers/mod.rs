#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stowage_core::FileUpload;
use stowage_ingest::{AttachmentUploadEvent, EventSink, SignedUrlIssuer};
use stowage_storage::{
    ByteReader, ByteStream, StorageAdapter, StorageBackend, StorageError, StorageResult,
};
use tokio::io::AsyncReadExt;

/// In-memory adapter that records every call.
///
/// With `public_base` set it behaves like an object store and returns
/// `{public_base}/{key}` from creates; otherwise it is path-backed.
#[derive(Default)]
pub struct MemoryAdapter {
    public_base: Option<String>,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    url_sources: Mutex<Vec<(String, String)>>,
}

impl MemoryAdapter {
    pub fn path_backed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn public(base: &str) -> Arc<Self> {
        Arc::new(Self {
            public_base: Some(base.trim_end_matches('/').to_string()),
            ..Default::default()
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// `(key, remote url)` pairs handed to `file_create_by_url`.
    pub fn url_sources(&self) -> Vec<(String, String)> {
        self.url_sources.lock().unwrap().clone()
    }

    fn created(&self, key: &str) -> Option<String> {
        self.public_base
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn file_create_by_stream(
        &self,
        key: &str,
        mut reader: ByteReader,
        _content_type: Option<&str>,
    ) -> StorageResult<Option<String>> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::Transfer(format!("Failed to read upload stream: {}", e)))?;

        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(self.created(key))
    }

    async fn file_create_by_url(&self, key: &str, url: &str) -> StorageResult<Option<String>> {
        self.url_sources
            .lock()
            .unwrap()
            .push((key.to_string(), url.to_string()));
        self.objects.lock().unwrap().insert(key.to_string(), Vec::new());
        Ok(self.created(key))
    }

    async fn file_read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn file_read_by_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.file_read(key).await?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(bytes::Bytes::from(data))])))
    }

    async fn file_delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn get_directory_list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        _filename: Option<&str>,
    ) -> StorageResult<String> {
        Ok(format!("memory://{}?expires={}", key, expires_in.as_secs()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

/// Signer that remembers which paths and keys it was asked to sign.
#[derive(Default)]
pub struct RecordingSigner {
    requests: Mutex<Vec<(String, String)>>,
}

impl RecordingSigner {
    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|(path, _)| path).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.requests().into_iter().map(|(_, key)| key).collect()
    }

    fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignedUrlIssuer for RecordingSigner {
    async fn signed_url(&self, path: &str, key: &str) -> StorageResult<String> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), key.to_string()));
        Ok(format!("signed:{}", path))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AttachmentUploadEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AttachmentUploadEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: AttachmentUploadEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Spool `content` to `dir/name` the way the web layer would.
pub fn spooled_file(dir: &Path, name: &str, mimetype: &str, content: &[u8]) -> FileUpload {
    static SPOOLED: AtomicUsize = AtomicUsize::new(0);
    let n = SPOOLED.fetch_add(1, Ordering::Relaxed);
    let spool = dir.join(format!("spool-{}-{}", n, sanitize(name)));
    std::fs::write(&spool, content).unwrap();

    FileUpload {
        originalname: name.to_string(),
        mimetype: mimetype.to_string(),
        size: content.len() as u64,
        path: spool,
    }
}

/// An upload whose source opens but fails on the first read.
pub fn broken_file(dir: &Path, name: &str) -> FileUpload {
    let unreadable: PathBuf = dir.join(format!("unreadable-{}", sanitize(name)));
    std::fs::create_dir_all(&unreadable).unwrap();

    FileUpload {
        originalname: name.to_string(),
        mimetype: "application/octet-stream".to_string(),
        size: 10,
        path: unreadable,
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}
