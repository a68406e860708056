//! Configuration module
//!
//! Storage backend selection, backend credentials and ingestion tuning, read
//! from the process environment (and an optional `.env` file).

use std::env;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_SIGNED_URL_EXPIRY_SECS, DEFAULT_UPLOAD_CONCURRENCY, DEFAULT_UPLOAD_ROOT,
    DEFAULT_URL_UPLOAD_MAX_REDIRECTS,
};
use crate::storage_types::StorageBackend;

#[derive(Clone, Debug)]
pub struct StowageConfig {
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_force_path_style: bool,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Ingestion
    pub upload_root: String,
    pub upload_concurrency: usize,
    pub signed_url_expiry_secs: u64,
    // URL uploads (SSRF prevention)
    pub url_upload_max_redirects: usize,
    // If set, only URLs from these domains (or their subdomains) are fetched
    pub url_upload_allowlist: Option<Vec<String>>,
    pub url_upload_allow_private_ips: bool,
}

impl Default for StowageConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_force_path_style: false,
            local_storage_path: None,
            local_storage_base_url: None,
            upload_root: DEFAULT_UPLOAD_ROOT.to_string(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            signed_url_expiry_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
            url_upload_max_redirects: DEFAULT_URL_UPLOAD_MAX_REDIRECTS,
            url_upload_allowlist: None,
            url_upload_allow_private_ips: false,
        }
    }
}

impl StowageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => StorageBackend::from_str(&raw)?,
            None => StorageBackend::S3,
        };

        let url_upload_allowlist = var("URL_UPLOAD_ALLOWLIST").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });

        let config = StowageConfig {
            storage_backend,
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            s3_access_key_id: var("S3_ACCESS_KEY_ID"),
            s3_secret_access_key: var("S3_SECRET_ACCESS_KEY"),
            s3_force_path_style: parse_bool(var("S3_FORCE_PATH_STYLE"), "S3_FORCE_PATH_STYLE")?
                .unwrap_or(false),
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL"),
            upload_root: var("UPLOAD_ROOT")
                .map(|root| root.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_UPLOAD_ROOT.to_string()),
            upload_concurrency: parse_number(var("UPLOAD_CONCURRENCY"), "UPLOAD_CONCURRENCY")?
                .unwrap_or(DEFAULT_UPLOAD_CONCURRENCY),
            signed_url_expiry_secs: parse_number(
                var("SIGNED_URL_EXPIRY_SECS"),
                "SIGNED_URL_EXPIRY_SECS",
            )?
            .unwrap_or(DEFAULT_SIGNED_URL_EXPIRY_SECS),
            url_upload_max_redirects: parse_number(
                var("URL_UPLOAD_MAX_REDIRECTS"),
                "URL_UPLOAD_MAX_REDIRECTS",
            )?
            .unwrap_or(DEFAULT_URL_UPLOAD_MAX_REDIRECTS),
            url_upload_allowlist,
            url_upload_allow_private_ips: parse_bool(
                var("URL_UPLOAD_ALLOW_PRIVATE_IPS"),
                "URL_UPLOAD_ALLOW_PRIVATE_IPS",
            )?
            .unwrap_or(false),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_concurrency == 0 {
            return Err(anyhow::anyhow!("UPLOAD_CONCURRENCY must be at least 1"));
        }

        if self.signed_url_expiry_secs == 0 {
            return Err(anyhow::anyhow!("SIGNED_URL_EXPIRY_SECS must be at least 1"));
        }

        if self.upload_root.is_empty() || self.upload_root.contains("..") {
            return Err(anyhow::anyhow!(
                "UPLOAD_ROOT must be a non-empty relative path without '..'"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET must be set for the s3 backend"));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set for the s3 backend"
                    ));
                }
                if self.s3_access_key_id.is_some() != self.s3_secret_access_key.is_some() {
                    return Err(anyhow::anyhow!(
                        "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set for the local backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(raw: Option<String>, key: &str) -> Result<Option<T>, anyhow::Error> {
    raw.map(|v| {
        v.parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key))
    })
    .transpose()
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<Option<bool>, anyhow::Error> {
    raw.map(|v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!("{} must be a boolean", key)),
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = StowageConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.upload_concurrency, 1);
        assert_eq!(config.signed_url_expiry_secs, 7200);
        assert_eq!(config.url_upload_max_redirects, 5);
        assert_eq!(config.upload_root, "uploads");
        assert!(!config.url_upload_allow_private_ips);
    }

    #[test]
    fn region_falls_back_to_aws_region() {
        let config = StowageConfig::from_lookup(lookup(&[
            ("S3_BUCKET", "attachments"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.s3_region.as_deref(), Some("eu-west-1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn allowlist_is_split_and_lowercased() {
        let config = StowageConfig::from_lookup(lookup(&[(
            "URL_UPLOAD_ALLOWLIST",
            "Example.com, cdn.example.com ,",
        )]))
        .unwrap();
        assert_eq!(
            config.url_upload_allowlist,
            Some(vec!["example.com".to_string(), "cdn.example.com".to_string()])
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = StowageConfig::from_lookup(lookup(&[("UPLOAD_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("UPLOAD_CONCURRENCY"));
    }

    #[test]
    fn validate_requires_backend_settings() {
        let s3 = StowageConfig::default();
        assert!(s3.validate().is_err());

        let local = StowageConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "local")])).unwrap();
        assert!(local.validate().is_err());

        let local = StowageConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/var/lib/stowage"),
        ]))
        .unwrap();
        assert!(local.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_half_credentials() {
        let mut config = StowageConfig {
            s3_bucket: Some("b".to_string()),
            s3_region: Some("us-east-1".to_string()),
            ..Default::default()
        };
        config.upload_concurrency = 0;
        assert!(config.validate().is_err());

        config.upload_concurrency = 4;
        config.s3_access_key_id = Some("AKIA".to_string());
        assert!(config.validate().is_err());
    }
}
