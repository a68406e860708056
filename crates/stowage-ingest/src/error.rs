use stowage_core::error::{codes, ErrorMetadata, LogLevel};
use stowage_storage::StorageError;
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad batch input (empty batch, unusable destination path)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The `HEAD` probe of a remote URL failed
    #[error("Failed to probe {url}: {source}")]
    Probe {
        url: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to issue signed URL for {path}: {source}")]
    SignedUrl {
        path: String,
        #[source]
        source: StorageError,
    },
}

impl IngestError {
    /// The storage failure underneath, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            IngestError::Validation(_) => None,
            IngestError::Storage(e) => Some(e),
            IngestError::Probe { source, .. } | IngestError::SignedUrl { source, .. } => {
                Some(source)
            }
        }
    }
}

impl ErrorMetadata for IngestError {
    fn error_code(&self) -> &'static str {
        match self.storage_error() {
            Some(e) => e.error_code(),
            None => codes::VALIDATION_ERROR,
        }
    }

    fn is_recoverable(&self) -> bool {
        self.storage_error().is_some_and(|e| e.is_recoverable())
    }

    fn log_level(&self) -> LogLevel {
        match self.storage_error() {
            Some(e) => e.log_level(),
            None => LogLevel::Debug,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
