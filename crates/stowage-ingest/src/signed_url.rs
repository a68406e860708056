//! Signed-link issuance for stored attachments.
//!
//! The orchestrator hands over a path and its storage key and gets back a
//! retrieval link; it never tracks expiry or caches links itself.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stowage_storage::{AdapterResolver, StorageResult};

/// Issues a signed retrieval link for an attachment.
///
/// `path` is what the attachment records: relative to the upload root for
/// path-backed attachments (e.g. `docs/a_x1y2z.pdf`) or the decoded URL
/// pathname for url-backed ones (e.g. `/bucket/uploads/docs/a_x1y2z.pdf`).
/// `key` is the storage key the object was written under.
#[async_trait]
pub trait SignedUrlIssuer: Send + Sync {
    async fn signed_url(&self, path: &str, key: &str) -> StorageResult<String>;
}

/// Signs through the active storage adapter.
pub struct AdapterSignedUrlIssuer {
    resolver: Arc<dyn AdapterResolver>,
    expires_in: Duration,
}

impl AdapterSignedUrlIssuer {
    pub fn new(resolver: Arc<dyn AdapterResolver>, expires_in: Duration) -> Self {
        Self {
            resolver,
            expires_in,
        }
    }
}

#[async_trait]
impl SignedUrlIssuer for AdapterSignedUrlIssuer {
    async fn signed_url(&self, path: &str, key: &str) -> StorageResult<String> {
        let adapter = self.resolver.storage_adapter().await?;
        tracing::debug!(path = %path, key = %key, "Issuing signed URL");

        adapter.get_signed_url(key, self.expires_in, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stowage_storage::{LocalAdapter, SsrfPolicy, StaticResolver, StorageAdapter, StorageError};
    use tempfile::tempdir;

    struct NoAdapter;

    #[async_trait]
    impl AdapterResolver for NoAdapter {
        async fn storage_adapter(&self) -> StorageResult<Arc<dyn StorageAdapter>> {
            Err(StorageError::Config("no storage configured".to_string()))
        }
    }

    fn issuer(resolver: Arc<dyn AdapterResolver>) -> AdapterSignedUrlIssuer {
        AdapterSignedUrlIssuer::new(resolver, Duration::from_secs(7200))
    }

    #[tokio::test]
    async fn test_signs_the_given_key_even_when_bucket_matches_root() {
        let dir = tempdir().unwrap();
        let local = Arc::new(
            LocalAdapter::new(
                dir.path(),
                Some("http://localhost:3000/files".to_string()),
                SsrfPolicy::default(),
            )
            .unwrap(),
        );
        local.init().await.unwrap();

        let signed = issuer(Arc::new(StaticResolver::new(local)))
            .signed_url("/uploads/uploads/docs/a.pdf", "uploads/docs/a.pdf")
            .await
            .unwrap();
        assert_eq!(signed, "http://localhost:3000/files/uploads/docs/a.pdf");
    }

    #[tokio::test]
    async fn test_resolver_failure_propagates() {
        let result = issuer(Arc::new(NoAdapter))
            .signed_url("docs/a.pdf", "uploads/docs/a.pdf")
            .await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
