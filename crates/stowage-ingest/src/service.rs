use crate::batch::{AllocatedKey, BatchCollector, BatchState, KeyAllocator};
use crate::error::{IngestError, IngestResult};
use crate::events::{AttachmentUploadEvent, EventSink, TracingEventSink};
use crate::signed_url::{AdapterSignedUrlIssuer, SignedUrlIssuer};
use futures::stream::{self, StreamExt};
use percent_encoding::percent_decode_str;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stowage_core::constants::{DEFAULT_UPLOAD_CONCURRENCY, DEFAULT_UPLOAD_ROOT, DOWNLOAD_PATH_PREFIX};
use stowage_core::filename::{basename_from_url_path, sanitize_path_segments, utf8ify};
use stowage_core::mime::{icon_for_file_name, mimetype_for_file_name, DEFAULT_MIMETYPE};
use stowage_core::models::Location;
use stowage_core::{Attachment, FileUpload, StowageConfig, UploadMode, UrlUpload};
use stowage_storage::keys::join_key;
use stowage_storage::remote::{guarded_client, probe_remote, RemoteProbe};
use stowage_storage::{
    ssrf_policy, AdapterResolver, LocalAdapter, SsrfPolicy, StaticResolver, StorageAdapter,
    StorageError,
};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Key prefix every upload lands under
    pub upload_root: String,
    /// Items in flight per batch
    pub concurrency: usize,
    /// Rules for URL-sourced uploads
    pub ssrf: SsrfPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            upload_root: DEFAULT_UPLOAD_ROOT.to_string(),
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            ssrf: SsrfPolicy::default(),
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &StowageConfig) -> Self {
        Self {
            upload_root: config.upload_root.clone(),
            concurrency: config.upload_concurrency,
            ssrf: ssrf_policy(config),
        }
    }
}

/// A locally stored attachment resolved for preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub content_type: String,
}

/// Destination shared by every item of one batch.
struct BatchContext {
    /// Sanitized caller directories, `/`-joined
    relative_dir: String,
    /// `<upload root>/<relative_dir>`
    prefix: String,
    keys: KeyAllocator,
}

/// Ingestion orchestrator
///
/// Uploads batches of files or remote URLs through whichever storage adapter
/// the resolver hands out, with at most `concurrency` items in flight.
pub struct AttachmentService {
    resolver: Arc<dyn AdapterResolver>,
    signer: Arc<dyn SignedUrlIssuer>,
    events: Arc<dyn EventSink>,
    options: IngestOptions,
    http: reqwest::Client,
    preview: Option<Arc<LocalAdapter>>,
}

impl AttachmentService {
    pub fn new(
        resolver: Arc<dyn AdapterResolver>,
        signer: Arc<dyn SignedUrlIssuer>,
        events: Arc<dyn EventSink>,
        options: IngestOptions,
    ) -> IngestResult<Self> {
        if options.concurrency == 0 {
            return Err(StorageError::Config(
                "Upload concurrency must be at least 1".to_string(),
            )
            .into());
        }

        let http = guarded_client(&options.ssrf)?;

        Ok(Self {
            resolver,
            signer,
            events,
            options,
            http,
            preview: None,
        })
    }

    /// Wire a service around one adapter with adapter-backed signing and
    /// log-only events.
    pub fn from_config(
        config: &StowageConfig,
        adapter: Arc<dyn StorageAdapter>,
    ) -> IngestResult<Self> {
        let resolver: Arc<dyn AdapterResolver> = Arc::new(StaticResolver::new(adapter));
        let signer = Arc::new(AdapterSignedUrlIssuer::new(
            Arc::clone(&resolver),
            Duration::from_secs(config.signed_url_expiry_secs),
        ));

        Self::new(
            resolver,
            signer,
            Arc::new(TracingEventSink),
            IngestOptions::from_config(config),
        )
    }

    /// Enable `get_file` through a local adapter.
    pub fn with_preview_adapter(mut self, local: Arc<LocalAdapter>) -> Self {
        self.preview = Some(local);
        self
    }

    /// Store spooled files under `path` (relative to the upload root).
    pub async fn upload(
        &self,
        path: Option<&str>,
        files: Vec<FileUpload>,
    ) -> IngestResult<Vec<Attachment>> {
        let adapter = self.resolver.storage_adapter().await?;
        let ctx = self.batch_context(path);
        let adapter = adapter.as_ref();
        let ctx_ref = &ctx;

        self.run_batch(UploadMode::File, files, move |file| {
            self.upload_file(adapter, ctx_ref, file)
        })
        .await
    }

    /// Fetch remote resources and store them under `path`.
    pub async fn upload_via_url(
        &self,
        path: Option<&str>,
        urls: Vec<UrlUpload>,
    ) -> IngestResult<Vec<Attachment>> {
        let adapter = self.resolver.storage_adapter().await?;
        let ctx = self.batch_context(path);
        let adapter = adapter.as_ref();
        let ctx_ref = &ctx;

        self.run_batch(UploadMode::Url, urls, move |item| {
            self.upload_url(adapter, ctx_ref, item)
        })
        .await
    }

    /// Resolve a locally stored attachment to its file on disk.
    ///
    /// Accepts an attachment `path` (`download/...`) or a storage key.
    pub fn get_file(&self, path: &str) -> IngestResult<LocalFile> {
        let local = self.preview.as_ref().ok_or_else(|| {
            StorageError::Config("File preview requires the local storage backend".to_string())
        })?;

        let trimmed = path.trim_start_matches('/');
        let key = match trimmed.strip_prefix(&format!("{}/", DOWNLOAD_PATH_PREFIX)) {
            Some(rest) => join_key(&[self.options.upload_root.as_str(), rest]),
            None => trimmed.to_string(),
        };

        let content_type = mimetype_for_file_name(&key).unwrap_or("text/plain");
        let path = local.validate_and_normalise_path(&key)?;

        Ok(LocalFile {
            path,
            content_type: content_type.to_string(),
        })
    }

    pub fn preview_available(&self, mimetype: &str) -> bool {
        stowage_core::mime::preview_available(mimetype)
    }

    fn batch_context(&self, path: Option<&str>) -> BatchContext {
        let segments = sanitize_path_segments(path);
        let relative_dir = join_key(&segments);
        let prefix = join_key(&[self.options.upload_root.as_str(), relative_dir.as_str()]);

        BatchContext {
            relative_dir,
            prefix,
            keys: KeyAllocator::new(),
        }
    }

    async fn run_batch<T, F, Fut>(
        &self,
        mode: UploadMode,
        items: Vec<T>,
        process: F,
    ) -> IngestResult<Vec<Attachment>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = IngestResult<Attachment>>,
    {
        let mut state = BatchState::Pending;
        if items.is_empty() {
            return Err(IngestError::Validation("No attachment provided".to_string()));
        }

        let total = items.len();
        let start = Instant::now();
        state = advance(mode, state, BatchState::Running);

        let mut collector = BatchCollector::new();
        let mut results = stream::iter(items)
            .map(process)
            .buffer_unordered(self.options.concurrency);
        while let Some(result) = results.next().await {
            collector.record(result);
        }

        let failures = collector.errors().len();
        if failures > 0 {
            for error in collector.errors() {
                tracing::error!(
                    error = %error,
                    mode = %mode,
                    "Attachment upload failed"
                );
            }
            advance(mode, state, BatchState::Failed);
            tracing::info!(
                mode = %mode,
                items = total,
                succeeded = collector.attachments().len(),
                failed = failures,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Attachment batch failed"
            );
            return collector.finish();
        }

        advance(mode, state, BatchState::Completed);
        tracing::info!(
            mode = %mode,
            items = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment batch completed"
        );
        self.events.emit(AttachmentUploadEvent::new(mode));

        collector.finish()
    }

    async fn upload_file(
        &self,
        adapter: &dyn StorageAdapter,
        ctx: &BatchContext,
        file: FileUpload,
    ) -> IngestResult<Attachment> {
        let original_name = utf8ify(&file.originalname);
        let allocated = ctx.keys.allocate(&ctx.prefix, &original_name);

        let url = adapter.file_create(&allocated.key, &file).await?;
        let location = self.locate(url, ctx, &allocated).await?;

        tracing::debug!(key = %allocated.key, size_bytes = file.size, "Attachment stored");

        Ok(Attachment {
            location,
            icon: icon_for_file_name(&original_name).map(String::from),
            title: original_name,
            mimetype: file.mimetype,
            size: Some(file.size),
        })
    }

    async fn upload_url(
        &self,
        adapter: &dyn StorageAdapter,
        ctx: &BatchContext,
        item: UrlUpload,
    ) -> IngestResult<Attachment> {
        let probe = probe_remote(&self.http, &self.options.ssrf, &item.url)
            .await
            .map_err(|source| IngestError::Probe {
                url: item.url.clone(),
                source,
            })?;

        let final_path = reqwest::Url::parse(&probe.final_url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let title = item
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| basename_from_url_path(&final_path));
        let title = if title.is_empty() {
            "file".to_string()
        } else {
            title
        };

        let allocated = ctx.keys.allocate(&ctx.prefix, &title);
        let url = adapter
            .file_create_by_url(&allocated.key, &probe.final_url)
            .await?;
        let location = self.locate(url, ctx, &allocated).await?;

        let (mimetype, size) = remote_metadata(&probe, &title, item.mimetype, item.size);

        tracing::debug!(
            key = %allocated.key,
            source_url = %probe.final_url,
            "Remote attachment stored"
        );

        Ok(Attachment {
            location,
            icon: icon_for_file_name(&title).map(String::from),
            title,
            mimetype,
            size,
        })
    }

    /// Decide between url-backed and path-backed metadata from what the
    /// adapter returned, and sign accordingly.
    async fn locate(
        &self,
        url: Option<String>,
        ctx: &BatchContext,
        allocated: &AllocatedKey,
    ) -> IngestResult<Location> {
        match url.filter(|u| !u.is_empty()) {
            Some(url) => {
                let parsed = reqwest::Url::parse(&url).map_err(|e| {
                    StorageError::Transfer(format!("Backend returned invalid URL {}: {}", url, e))
                })?;
                let pathname = percent_decode_str(parsed.path())
                    .decode_utf8_lossy()
                    .into_owned();
                let signed_url = self.sign(&pathname, &allocated.key).await?;

                Ok(Location::Url { url, signed_url })
            }
            None => {
                let relative = join_key(&[ctx.relative_dir.as_str(), allocated.file_name.as_str()]);
                let path = join_key(&[DOWNLOAD_PATH_PREFIX, relative.as_str()]);
                let signed_path = self.sign(&relative, &allocated.key).await?;

                Ok(Location::Path { path, signed_path })
            }
        }
    }

    async fn sign(&self, path: &str, key: &str) -> IngestResult<String> {
        self.signer
            .signed_url(path, key)
            .await
            .map_err(|source| IngestError::SignedUrl {
                path: path.to_string(),
                source,
            })
    }
}

/// Content type and size for a URL upload. Caller-supplied values override
/// the probed ones; the extension lookup is the last resort.
fn remote_metadata(
    probe: &RemoteProbe,
    title: &str,
    caller_mimetype: Option<String>,
    caller_size: Option<u64>,
) -> (String, Option<u64>) {
    let probed = probe
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(String::from);

    let mimetype = caller_mimetype
        .filter(|ct| !ct.trim().is_empty())
        .or(probed)
        .or_else(|| mimetype_for_file_name(title).map(String::from))
        .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());

    (mimetype, caller_size.or(probe.content_length))
}

fn advance(mode: UploadMode, from: BatchState, to: BatchState) -> BatchState {
    tracing::debug!(mode = %mode, from = %from, to = %to, "Attachment batch state");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn local_service(dir: &std::path::Path) -> (AttachmentService, Arc<LocalAdapter>) {
        let local = Arc::new(
            LocalAdapter::new(
                dir,
                Some("http://localhost:3000/files".to_string()),
                SsrfPolicy::default(),
            )
            .unwrap(),
        );
        local.init().await.unwrap();

        let config = StowageConfig::default();
        let service = AttachmentService::from_config(&config, local.clone())
            .unwrap()
            .with_preview_adapter(local.clone());
        (service, local)
    }

    fn probe(content_type: Option<&str>, content_length: Option<u64>) -> RemoteProbe {
        RemoteProbe {
            final_url: "https://cdn.example.com/a".to_string(),
            content_type: content_type.map(String::from),
            content_length,
        }
    }

    #[test]
    fn test_remote_metadata_prefers_caller_overrides() {
        let (mimetype, size) = remote_metadata(
            &probe(Some("image/png; charset=binary"), Some(10)),
            "a.jpg",
            Some("image/jpeg".to_string()),
            Some(99),
        );
        assert_eq!(mimetype, "image/jpeg");
        assert_eq!(size, Some(99));
    }

    #[test]
    fn test_remote_metadata_falls_back_to_probe_then_extension() {
        let (mimetype, size) = remote_metadata(
            &probe(Some("image/png; charset=binary"), Some(10)),
            "a.jpg",
            Some("  ".to_string()),
            None,
        );
        assert_eq!(mimetype, "image/png");
        assert_eq!(size, Some(10));

        let (mimetype, size) = remote_metadata(&probe(Some(" ; x"), None), "a.jpg", None, None);
        assert_eq!(mimetype, "image/jpeg");
        assert_eq!(size, None);

        let (mimetype, _) = remote_metadata(&probe(None, None), "blob", None, None);
        assert_eq!(mimetype, DEFAULT_MIMETYPE);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let dir = tempdir().unwrap();
        let (service, _) = local_service(dir.path()).await;

        let err = service.upload(None, Vec::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = service.upload_via_url(None, Vec::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let dir = tempdir().unwrap();
        let (_, local) = local_service(dir.path()).await;

        let config = StowageConfig {
            upload_concurrency: 0,
            ..Default::default()
        };
        assert!(AttachmentService::from_config(&config, local).is_err());
    }

    #[tokio::test]
    async fn test_get_file_resolves_attachment_paths() {
        let dir = tempdir().unwrap();
        let (service, _) = local_service(dir.path()).await;

        let file = service.get_file("download/docs/a_x1y2z.pdf").unwrap();
        assert!(file.path.ends_with("uploads/docs/a_x1y2z.pdf"));
        assert!(file.path.is_absolute());
        assert_eq!(file.content_type, "application/pdf");

        let file = service.get_file("uploads/notes").unwrap();
        assert_eq!(file.content_type, "text/plain");

        assert!(service.get_file("download/../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_get_file_needs_local_adapter() {
        let dir = tempdir().unwrap();
        let (_, local) = local_service(dir.path()).await;
        let service = AttachmentService::from_config(&StowageConfig::default(), local).unwrap();

        let err = service.get_file("download/a.pdf").unwrap_err();
        assert!(matches!(err, IngestError::Storage(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_preview_available() {
        let dir = tempdir().unwrap();
        let local = Arc::new(LocalAdapter::new(dir.path(), None, SsrfPolicy::default()).unwrap());
        let service = AttachmentService::from_config(&StowageConfig::default(), local).unwrap();

        assert!(service.preview_available("image/png"));
        assert!(service.preview_available("application/pdf"));
        assert!(service.preview_available("text/plain"));
        assert!(!service.preview_available("application/zip"));
    }
}
