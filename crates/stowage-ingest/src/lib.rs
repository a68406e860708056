//! Stowage ingestion
//!
//! The `AttachmentService` takes batches of spooled files or remote URLs,
//! derives collision-free storage keys under the upload root, stores each
//! item through the active `StorageAdapter`, signs access links and reports
//! the batch outcome.
//!
//! Items are processed with bounded concurrency. Every item runs to
//! completion; if any failed, all failures are logged and the first one is
//! returned to the caller.

pub mod batch;
pub mod error;
pub mod events;
pub mod service;
pub mod signed_url;

pub use batch::{BatchCollector, BatchState, KeyAllocator};
pub use error::{IngestError, IngestResult};
pub use events::{AttachmentUploadEvent, EventSink, TracingEventSink};
pub use service::{AttachmentService, IngestOptions, LocalFile};
pub use signed_url::{AdapterSignedUrlIssuer, SignedUrlIssuer};
