#[cfg(feature = "storage-local")]
use crate::LocalAdapter;
#[cfg(feature = "storage-s3")]
use crate::{S3Adapter, S3Settings};
use crate::{SsrfPolicy, StorageAdapter, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use stowage_core::StowageConfig;

/// SSRF rules for server-initiated fetches, taken from configuration.
pub fn ssrf_policy(config: &StowageConfig) -> SsrfPolicy {
    SsrfPolicy {
        allow_private_ips: config.url_upload_allow_private_ips,
        allowlist: config.url_upload_allowlist.clone(),
        max_redirects: config.url_upload_max_redirects,
    }
}

/// Create and initialise the storage adapter selected by configuration.
pub async fn create_adapter(config: &StowageConfig) -> StorageResult<Arc<dyn StorageAdapter>> {
    let policy = ssrf_policy(config);

    let adapter: Arc<dyn StorageAdapter> = match config.storage_backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::Config("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::Config("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let settings = S3Settings {
                bucket,
                region,
                endpoint: config.s3_endpoint.clone(),
                access_key_id: config.s3_access_key_id.clone(),
                secret_access_key: config.s3_secret_access_key.clone(),
                force_path_style: config.s3_force_path_style,
            };
            Arc::new(S3Adapter::new(settings, policy)?)
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => {
            return Err(StorageError::Config(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::Config("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            Arc::new(LocalAdapter::new(
                base_path,
                config.local_storage_base_url.clone(),
                policy,
            )?)
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::Config(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
    };

    adapter.init().await?;

    tracing::info!(backend = %adapter.backend_type(), "Storage adapter ready");

    Ok(adapter)
}

/// Source of the active storage adapter.
///
/// Consumers ask for the adapter on each operation instead of holding one, so
/// the active backend can be swapped without rebuilding them.
#[async_trait]
pub trait AdapterResolver: Send + Sync {
    async fn storage_adapter(&self) -> StorageResult<Arc<dyn StorageAdapter>>;
}

/// Resolver that always hands out the same adapter.
#[derive(Clone)]
pub struct StaticResolver {
    adapter: Arc<dyn StorageAdapter>,
}

impl StaticResolver {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl AdapterResolver for StaticResolver {
    async fn storage_adapter(&self) -> StorageResult<Arc<dyn StorageAdapter>> {
        Ok(Arc::clone(&self.adapter))
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_local_adapter_from_config() {
        let dir = tempdir().unwrap();
        let config = StowageConfig {
            storage_backend: StorageBackend::Local,
            local_storage_path: Some(dir.path().join("store").display().to_string()),
            ..Default::default()
        };

        let adapter = create_adapter(&config).await.unwrap();
        assert_eq!(adapter.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("store").is_dir());

        let resolver = StaticResolver::new(adapter);
        let resolved = resolver.storage_adapter().await.unwrap();
        assert_eq!(resolved.backend_type(), StorageBackend::Local);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_a_config_error() {
        let config = StowageConfig {
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            create_adapter(&config).await,
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    fn test_ssrf_policy_from_config() {
        let config = StowageConfig {
            url_upload_allowlist: Some(vec!["cdn.example.com".to_string()]),
            url_upload_max_redirects: 3,
            ..Default::default()
        };

        let policy = ssrf_policy(&config);
        assert!(!policy.allow_private_ips);
        assert_eq!(policy.max_redirects, 3);
        assert_eq!(
            policy.allowlist.as_deref(),
            Some(&["cdn.example.com".to_string()][..])
        );
    }
}
