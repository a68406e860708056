//! Domain events emitted by the orchestrator.

use serde::Serialize;
use stowage_core::UploadMode;

pub const ATTACHMENT_UPLOAD_EVENT: &str = "attachment_upload";

/// Emitted once per successfully completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentUploadEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub mode: UploadMode,
}

impl AttachmentUploadEvent {
    pub fn new(mode: UploadMode) -> Self {
        Self {
            event_type: ATTACHMENT_UPLOAD_EVENT,
            mode,
        }
    }
}

/// Fire-and-forget event destination.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AttachmentUploadEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: AttachmentUploadEvent) {
        tracing::info!(
            event_type = event.event_type,
            mode = %event.mode,
            "Domain event emitted"
        );
    }
}
