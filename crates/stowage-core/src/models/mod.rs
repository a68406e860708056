//! Domain models exchanged between the orchestrator and its callers.

mod attachment;
mod upload;

pub use attachment::{Attachment, Location};
pub use upload::{FileUpload, UploadMode, UrlUpload};
