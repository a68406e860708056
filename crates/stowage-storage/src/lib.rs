//! Stowage Storage Library
//!
//! This crate provides the `StorageAdapter` contract and its implementations
//! for S3-compatible object storage and the local filesystem, plus the
//! SSRF-guarded HTTP client used when an adapter republishes a remote URL.
//!
//! # Storage key format
//!
//! Keys are `/`-separated relative paths such as
//! `uploads/<dir>/<stem>_<suffix><ext>`. Keys must not contain `..` or a
//! leading `/`. Key helpers live in the `keys` module so all backends stay
//! consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod remote;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod ssrf;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_adapter, ssrf_policy, AdapterResolver, StaticResolver};
#[cfg(feature = "storage-local")]
pub use local::LocalAdapter;
#[cfg(feature = "storage-s3")]
pub use s3::{S3Adapter, S3Settings};
pub use ssrf::SsrfPolicy;
pub use stowage_core::StorageBackend;
pub use traits::{ByteReader, ByteStream, StorageAdapter, StorageError, StorageResult};
