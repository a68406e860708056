//! Defaults shared across crates.

/// Prefix under which every uploaded object is stored.
pub const DEFAULT_UPLOAD_ROOT: &str = "uploads";

/// Prefix of the path handed back for path-backed (non-public) attachments.
pub const DOWNLOAD_PATH_PREFIX: &str = "download";

/// Number of items uploaded at once within a batch.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 1;

/// Lifetime of signed retrieval links.
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 7200;

/// Redirects followed while probing a remote URL.
pub const DEFAULT_URL_UPLOAD_MAX_REDIRECTS: usize = 5;

/// Length of the random suffix appended to stored filenames.
pub const FILENAME_SUFFIX_LEN: usize = 5;

/// Key written and removed by the backend health probe.
pub const PROBE_OBJECT_KEY: &str = "stowage-test-file.txt";
