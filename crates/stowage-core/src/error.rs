//! Error classification shared by the storage and ingestion crates.
//!
//! Each crate owns its own `thiserror` enum; this module only defines how an
//! error describes itself to callers and to the logging layer.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for rejected-but-harmless input such as blocked URLs
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Self-description of an error for callers that should not match on variants.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSFER_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation may succeed
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Error codes, one per failure kind.
pub mod codes {
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const TRANSFER_ERROR: &str = "TRANSFER_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const SSRF_BLOCKED: &str = "SSRF_BLOCKED";
}
