//! Per-batch bookkeeping: lifecycle state, storage-key allocation and the
//! success/error collections.

use crate::error::IngestError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use stowage_core::filename::unique_file_name;
use stowage_core::Attachment;
use stowage_storage::keys::join_key;

/// Batch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Pending => "pending",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Hands out storage keys that are unique within one batch.
///
/// The random suffix alone makes collisions unlikely; remembering issued keys
/// makes them impossible inside a batch.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    issued: Mutex<HashSet<String>>,
}

/// A reserved destination for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedKey {
    /// Full storage key, `<prefix>/<file_name>`
    pub key: String,
    /// Generated `<stem>_<suffix><ext>` name
    pub file_name: String,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, prefix: &str, original_name: &str) -> AllocatedKey {
        loop {
            let file_name = unique_file_name(original_name);
            let key = join_key(&[prefix, file_name.as_str()]);

            let mut issued = match self.issued.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if issued.insert(key.clone()) {
                return AllocatedKey { key, file_name };
            }
        }
    }
}

/// Results of a batch, in completion order.
#[derive(Debug, Default)]
pub struct BatchCollector {
    attachments: Vec<Attachment>,
    errors: Vec<IngestError>,
}

impl BatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: Result<Attachment, IngestError>) {
        match result {
            Ok(attachment) => self.attachments.push(attachment),
            Err(err) => self.errors.push(err),
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn errors(&self) -> &[IngestError] {
        &self.errors
    }

    /// All attachments if every item succeeded, otherwise the first
    /// recorded error.
    pub fn finish(self) -> Result<Vec<Attachment>, IngestError> {
        match self.errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(self.attachments),
        }
    }
}
