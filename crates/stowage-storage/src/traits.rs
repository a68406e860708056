//! Storage adapter contract
//!
//! This module defines the `StorageAdapter` trait that every storage backend
//! must implement, together with the error type shared by all backends.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use stowage_core::constants::PROBE_OBJECT_KEY;
use stowage_core::error::{codes, ErrorMetadata, LogLevel};
use stowage_core::FileUpload;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Remote URL blocked: {0}")]
    SsrfBlocked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorMetadata for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            StorageError::Config(_) => codes::CONFIGURATION_ERROR,
            StorageError::InvalidKey(_) => codes::VALIDATION_ERROR,
            StorageError::Transfer(_) | StorageError::Io(_) => codes::TRANSFER_ERROR,
            StorageError::NotFound(_) => codes::NOT_FOUND,
            StorageError::SsrfBlocked(_) => codes::SSRF_BLOCKED,
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::Transfer(_) | StorageError::Io(_))
    }

    fn log_level(&self) -> LogLevel {
        match self {
            StorageError::InvalidKey(_) | StorageError::NotFound(_) => LogLevel::Debug,
            StorageError::SsrfBlocked(_) => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Readable byte source handed to the create operations.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Chunked byte stream returned by streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage adapter contract
///
/// All storage backends (S3, local filesystem) implement this trait so the
/// ingestion orchestrator can work with whichever backend is active without
/// knowing its concrete type.
///
/// The create operations return `Some(url)` when the backend exposes the
/// object at a public location and `None` when the object is only reachable
/// by key (through a signed indirection).
///
/// `init` must complete once before any other operation is called; an
/// adapter is then shared read-only across concurrent uploads.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Establish connectivity and credentials. Calling it again is a no-op.
    async fn init(&self) -> StorageResult<()>;

    /// Upload a local file from disk.
    async fn file_create(&self, key: &str, file: &FileUpload) -> StorageResult<Option<String>> {
        let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
            StorageError::Transfer(format!(
                "Failed to open upload source {}: {}",
                file.path.display(),
                e
            ))
        })?;

        self.file_create_by_stream(key, Box::pin(handle), Some(file.mimetype.as_str()))
            .await
    }

    /// Upload from an in-flight byte stream. A read error on `reader` fails
    /// the upload.
    async fn file_create_by_stream(
        &self,
        key: &str,
        reader: ByteReader,
        content_type: Option<&str>,
    ) -> StorageResult<Option<String>>;

    /// Fetch a remote resource and republish it under `key`. Fetches that
    /// resolve (directly or through redirects) to loopback, link-local or
    /// private addresses fail with `SsrfBlocked`.
    async fn file_create_by_url(&self, key: &str, url: &str) -> StorageResult<Option<String>>;

    /// Read a whole object.
    async fn file_read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Read an object as a stream of chunks.
    async fn file_read_by_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Remove an object. Removing an absent object succeeds.
    async fn file_delete(&self, key: &str) -> StorageResult<()>;

    /// Keys stored under `prefix`.
    async fn get_directory_list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Time-limited retrieval URL. With `filename`, the response is served
    /// as a download under that name instead of inline.
    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        filename: Option<&str>,
    ) -> StorageResult<String>;

    /// Write a small probe object and delete it again.
    async fn test(&self) -> StorageResult<bool> {
        let probe = tempfile::NamedTempFile::new()?;
        let upload = FileUpload {
            originalname: "temp.txt".to_string(),
            mimetype: "text/plain".to_string(),
            size: 0,
            path: probe.path().to_path_buf(),
        };

        self.file_create(PROBE_OBJECT_KEY, &upload).await?;
        self.file_delete(PROBE_OBJECT_KEY).await?;

        tracing::debug!(
            backend = %self.backend_type(),
            key = PROBE_OBJECT_KEY,
            "Storage probe succeeded"
        );

        Ok(true)
    }

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
