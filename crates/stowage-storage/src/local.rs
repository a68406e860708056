use crate::keys::{attachment_disposition, validate_key};
use crate::remote::{fetch_remote, guarded_client};
use crate::ssrf::SsrfPolicy;
use crate::traits::{ByteReader, ByteStream, StorageAdapter, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

/// Local filesystem storage adapter
///
/// Objects live under `base_path` at their key. Creates return `None`: local
/// objects are reached through a signed indirection, never a public URL.
pub struct LocalAdapter {
    base_path: PathBuf,
    base_url: Option<String>,
    root: OnceCell<PathBuf>,
    http: reqwest::Client,
    policy: SsrfPolicy,
}

impl LocalAdapter {
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/stowage")
    /// * `base_url` - Base URL the files are served from, used for signed
    ///   links (e.g., "http://localhost:3000/files")
    pub fn new(
        base_path: impl Into<PathBuf>,
        base_url: Option<String>,
        policy: SsrfPolicy,
    ) -> StorageResult<Self> {
        let http = guarded_client(&policy)?;

        Ok(LocalAdapter {
            base_path: base_path.into(),
            base_url,
            root: OnceCell::new(),
            http,
            policy,
        })
    }

    fn root(&self) -> StorageResult<&Path> {
        self.root
            .get()
            .map(PathBuf::as_path)
            .ok_or_else(|| StorageError::Config("Local adapter used before init".to_string()))
    }

    /// Resolve a key to an absolute path inside the storage root.
    pub fn validate_and_normalise_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        // Path separator on Windows.
        if key.contains('\\') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        let root = self.root()?;
        let path = root.join(key);

        // Existing paths may be symlinks; make sure they still land inside.
        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(root).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_stream(&self, path: &Path, reader: &mut ByteReader) -> StorageResult<u64> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::Transfer(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let bytes_copied = tokio::io::copy(reader, &mut file).await.map_err(|e| {
            StorageError::Transfer(format!(
                "Failed to write stream to file {}: {}",
                path.display(),
                e
            ))
        })?;

        file.flush().await?;
        file.sync_all().await.map_err(|e| {
            StorageError::Transfer(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Ok(bytes_copied)
    }
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    async fn init(&self) -> StorageResult<()> {
        self.root
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.base_path).await.map_err(|e| {
                    StorageError::Config(format!(
                        "Failed to create storage directory {}: {}",
                        self.base_path.display(),
                        e
                    ))
                })?;

                fs::canonicalize(&self.base_path).await.map_err(|e| {
                    StorageError::Config(format!("Failed to canonicalize base path: {}", e))
                })
            })
            .await?;

        Ok(())
    }

    async fn file_create_by_stream(
        &self,
        key: &str,
        mut reader: ByteReader,
        _content_type: Option<&str>,
    ) -> StorageResult<Option<String>> {
        let path = self.validate_and_normalise_path(key)?;
        let start = Instant::now();

        self.ensure_parent_dir(&path).await?;

        match self.write_stream(&path, &mut reader).await {
            Ok(bytes_copied) => {
                tracing::info!(
                    path = %path.display(),
                    key = %key,
                    size_bytes = bytes_copied,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream upload successful"
                );
                Ok(None)
            }
            Err(err) => {
                // Leave no partial object behind.
                if let Err(e) = fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            error = %e,
                            path = %path.display(),
                            "Failed to remove partial upload"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn file_create_by_url(&self, key: &str, url: &str) -> StorageResult<Option<String>> {
        self.validate_and_normalise_path(key)?;
        let body = fetch_remote(&self.http, &self.policy, url).await?;

        self.file_create_by_stream(key, body.reader, body.probe.content_type.as_deref())
            .await
    }

    async fn file_read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.validate_and_normalise_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        fs::read(&path).await.map_err(|e| {
            StorageError::Transfer(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    async fn file_read_by_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.validate_and_normalise_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::Transfer(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let stream = tokio_util::io::ReaderStream::new(file).map(|result| {
            result.map_err(|e| StorageError::Transfer(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn file_delete(&self, key: &str) -> StorageResult<()> {
        let path = self.validate_and_normalise_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Transfer(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn get_directory_list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = self.root()?.to_path_buf();
        let start_dir = if prefix.trim_matches('/').is_empty() {
            root.clone()
        } else {
            self.validate_and_normalise_path(prefix.trim_matches('/'))?
        };

        let mut keys = Vec::new();
        let mut pending = vec![start_dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn get_signed_url(
        &self,
        key: &str,
        _expires_in: Duration,
        filename: Option<&str>,
    ) -> StorageResult<String> {
        self.validate_and_normalise_path(key)?;

        let base_url = self.base_url.as_deref().ok_or_else(|| {
            StorageError::Config("LOCAL_STORAGE_BASE_URL not configured".to_string())
        })?;

        let url = format!("{}/{}", base_url.trim_end_matches('/'), key);
        Ok(match filename {
            Some(name) => format!(
                "{}?response-content-disposition={}",
                url,
                urlencoding::encode(&attachment_disposition(name))
            ),
            None => url,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
