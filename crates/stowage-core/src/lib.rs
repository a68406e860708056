//! Stowage Core Library
//!
//! This crate provides the domain models, configuration, filename helpers and
//! MIME tables shared by the storage adapters and the ingestion orchestrator.

pub mod config;
pub mod constants;
pub mod error;
pub mod filename;
pub mod mime;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::StowageConfig;
pub use error::{ErrorMetadata, LogLevel};
pub use models::{Attachment, FileUpload, UploadMode, UrlUpload};
pub use storage_types::StorageBackend;
