//! Stowage CLI: ingest files and URLs into the configured storage backend.
//!
//! Configuration comes from the environment (or `.env`): STORAGE_BACKEND,
//! S3_BUCKET, S3_REGION, LOCAL_STORAGE_PATH, UPLOAD_ROOT, ...

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stowage_cli::{file_upload_from_path, init_tracing};
use stowage_core::{StorageBackend, StowageConfig, UrlUpload};
use stowage_ingest::AttachmentService;
use stowage_storage::{create_adapter, ssrf_policy, LocalAdapter, StorageAdapter};

#[derive(Parser)]
#[command(name = "stowage", about = "Attachment ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Destination directory under the upload root
        #[arg(long)]
        path: Option<String>,
    },
    /// Fetch remote URLs and store them
    UploadUrl {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Destination directory under the upload root
        #[arg(long)]
        path: Option<String>,
        /// Title to use instead of the URL's file name (single URL only)
        #[arg(long)]
        file_name: Option<String>,
    },
    /// Write and delete a probe object on the active backend
    Health,
    /// Issue a signed retrieval URL for a storage key
    Sign {
        key: String,
        /// Lifetime in seconds (defaults to SIGNED_URL_EXPIRY_SECS)
        #[arg(long)]
        expires: Option<u64>,
        /// Force a download under this file name
        #[arg(long)]
        filename: Option<String>,
    },
    /// Delete a storage key
    Delete { key: String },
    /// List keys under a prefix
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Resolve a locally stored attachment for preview
    Preview { path: String },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn local_adapter(config: &StowageConfig) -> anyhow::Result<Arc<LocalAdapter>> {
    if config.storage_backend != StorageBackend::Local {
        anyhow::bail!("Preview is only available with STORAGE_BACKEND=local");
    }
    let base_path = config
        .local_storage_path
        .clone()
        .context("LOCAL_STORAGE_PATH not configured")?;

    let local = Arc::new(LocalAdapter::new(
        base_path,
        config.local_storage_base_url.clone(),
        ssrf_policy(config),
    )?);
    local.init().await?;
    Ok(local)
}

async fn storage(config: &StowageConfig) -> anyhow::Result<Arc<dyn StorageAdapter>> {
    create_adapter(config)
        .await
        .context("Failed to initialise storage backend")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = StowageConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Upload { files, path } => {
            let uploads = files
                .iter()
                .map(|file| file_upload_from_path(file))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let service = AttachmentService::from_config(&config, storage(&config).await?)?;
            let attachments = service.upload(path.as_deref(), uploads).await?;
            print_json(&attachments)?;
        }
        Commands::UploadUrl {
            urls,
            path,
            file_name,
        } => {
            if file_name.is_some() && urls.len() > 1 {
                anyhow::bail!("--file-name can only be used with a single URL");
            }
            let requests = urls
                .into_iter()
                .map(|url| UrlUpload {
                    file_name: file_name.clone(),
                    ..UrlUpload::new(url)
                })
                .collect();
            let service = AttachmentService::from_config(&config, storage(&config).await?)?;
            let attachments = service.upload_via_url(path.as_deref(), requests).await?;
            print_json(&attachments)?;
        }
        Commands::Health => {
            let adapter = storage(&config).await?;
            let ok = adapter.test().await?;
            print_json(&serde_json::json!({
                "backend": adapter.backend_type().to_string(),
                "ok": ok,
            }))?;
        }
        Commands::Sign {
            key,
            expires,
            filename,
        } => {
            let expires_in =
                Duration::from_secs(expires.unwrap_or(config.signed_url_expiry_secs));
            let url = storage(&config)
                .await?
                .get_signed_url(&key, expires_in, filename.as_deref())
                .await?;
            print_json(&serde_json::json!({ "key": key, "signedUrl": url }))?;
        }
        Commands::Delete { key } => {
            storage(&config).await?.file_delete(&key).await?;
            print_json(&serde_json::json!({ "success": true, "key": key }))?;
        }
        Commands::List { prefix } => {
            let keys = storage(&config).await?.get_directory_list(&prefix).await?;
            print_json(&keys)?;
        }
        Commands::Preview { path } => {
            let local = local_adapter(&config).await?;
            let service = AttachmentService::from_config(&config, local.clone())?
                .with_preview_adapter(local);
            let file = service.get_file(&path)?;

            print_json(&serde_json::json!({
                "path": file.path,
                "type": file.content_type,
                "previewAvailable": service.preview_available(&file.content_type),
            }))?;
        }
    }

    Ok(())
}
