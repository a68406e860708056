use anyhow::Context;
use std::path::Path;
use stowage_core::filename::utf8ify;
use stowage_core::mime::{mimetype_for_file_name, DEFAULT_MIMETYPE};
use stowage_core::FileUpload;

/// Describe a file on disk as an upload, guessing its type from the
/// extension.
pub fn file_upload_from_path(path: &Path) -> anyhow::Result<FileUpload> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }

    let originalname = path
        .file_name()
        .map(|name| utf8ify(&name.to_string_lossy()))
        .with_context(|| format!("{} has no file name", path.display()))?;
    let mimetype = mimetype_for_file_name(&originalname).unwrap_or(DEFAULT_MIMETYPE);

    Ok(FileUpload {
        mimetype: mimetype.to_string(),
        originalname,
        size: metadata.len(),
        path: path.to_path_buf(),
    })
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
