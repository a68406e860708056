use crate::keys::{attachment_disposition, validate_key};
use crate::remote::{fetch_remote, guarded_client};
use crate::ssrf::SsrfPolicy;
use crate::traits::{ByteReader, ByteStream, StorageAdapter, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use std::time::{Duration, Instant};
use stowage_core::mime::DEFAULT_MIMETYPE;
use tokio::io::AsyncReadExt;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;

/// Parts are 5MB, the S3 minimum for every part but the last.
const PART_SIZE: usize = 5 * 1024 * 1024;

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    /// (e.g. "http://localhost:9000" for MinIO)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Address objects as `{endpoint}/{bucket}/{key}` instead of
    /// `{bucket}.{endpoint host}/{key}`
    pub force_path_style: bool,
}

/// S3 storage adapter
///
/// The SDK client is built by `init`. Retries are left to the caller, so the
/// client is configured without any.
pub struct S3Adapter {
    settings: S3Settings,
    client: OnceCell<Client>,
    http: reqwest::Client,
    policy: SsrfPolicy,
}

impl S3Adapter {
    pub fn new(settings: S3Settings, policy: SsrfPolicy) -> StorageResult<Self> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Config("S3 bucket is required".to_string()));
        }
        if settings.region.is_empty() {
            return Err(StorageError::Config("S3 region is required".to_string()));
        }

        let http = guarded_client(&policy)?;

        Ok(Self {
            settings,
            client: OnceCell::new(),
            http,
            policy,
        })
    }

    async fn build_client(&self) -> StorageResult<Client> {
        let region = Region::new(self.settings.region.clone());

        let mut builder = match (
            &self.settings.access_key_id,
            &self.settings.secret_access_key,
        ) {
            (Some(key_id), Some(secret)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "stowage-static",
                )),
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::Config(
                    "S3 access key id and secret must be set together".to_string(),
                ))
            }
        };

        builder = builder.retry_config(RetryConfig::disabled());
        if let Some(ref endpoint) = self.settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(self.settings.force_path_style);

        Ok(Client::from_conf(builder.build()))
    }

    fn client(&self) -> StorageResult<&Client> {
        self.client
            .get()
            .ok_or_else(|| StorageError::Config("S3 adapter used before init".to_string()))
    }

    /// Public URL of an object.
    fn generate_url(&self, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let bucket = &self.settings.bucket;

        match self.settings.endpoint {
            Some(ref endpoint) if self.settings.force_path_style => {
                format!(
                    "{}/{}/{}",
                    endpoint.trim_end_matches('/'),
                    bucket,
                    encoded_key
                )
            }
            Some(ref endpoint) => match reqwest::Url::parse(endpoint) {
                Ok(parsed) => {
                    let host = parsed.host_str().unwrap_or_default();
                    match parsed.port() {
                        Some(port) => format!(
                            "{}://{}.{}:{}/{}",
                            parsed.scheme(),
                            bucket,
                            host,
                            port,
                            encoded_key
                        ),
                        None => format!(
                            "{}://{}.{}/{}",
                            parsed.scheme(),
                            bucket,
                            host,
                            encoded_key
                        ),
                    }
                }
                Err(_) => format!(
                    "{}/{}/{}",
                    endpoint.trim_end_matches('/'),
                    bucket,
                    encoded_key
                ),
            },
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                bucket, self.settings.region, encoded_key
            ),
        }
    }

    async fn put_single(
        &self,
        client: &Client,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<u64> {
        let size = data.len() as u64;

        client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .body(S3Body::from(Bytes::from(data)))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.settings.bucket,
                    key = %key,
                    size_bytes = size,
                    "S3 upload failed"
                );
                StorageError::Transfer(e.to_string())
            })?;

        Ok(size)
    }

    async fn put_multipart(
        &self,
        client: &Client,
        key: &str,
        first_part: Vec<u8>,
        reader: &mut ByteReader,
        content_type: &str,
    ) -> StorageResult<u64> {
        let create_result = client
            .create_multipart_upload()
            .bucket(&self.settings.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.settings.bucket,
                    key = %key,
                    "Failed to create multipart upload"
                );
                StorageError::Transfer(e.to_string())
            })?;

        let upload_id = create_result
            .upload_id()
            .ok_or_else(|| StorageError::Transfer("No upload ID returned from S3".to_string()))?
            .to_string();

        match self
            .upload_parts(client, key, &upload_id, first_part, reader)
            .await
        {
            Ok(total_size) => Ok(total_size),
            Err(err) => {
                if let Err(abort_err) = client
                    .abort_multipart_upload()
                    .bucket(&self.settings.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        error = %abort_err,
                        key = %key,
                        upload_id = %upload_id,
                        "Failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        client: &Client,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        reader: &mut ByteReader,
    ) -> StorageResult<u64> {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut total_size = 0u64;
        let mut part = first_part;

        loop {
            let bytes_in_part = part.len();
            total_size += bytes_in_part as u64;

            let upload_part_result = client
                .upload_part()
                .bucket(&self.settings.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(S3Body::from(Bytes::from(part)))
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.settings.bucket,
                        key = %key,
                        part_number = part_number,
                        "Failed to upload part"
                    );
                    StorageError::Transfer(e.to_string())
                })?;

            let etag = upload_part_result
                .e_tag()
                .ok_or_else(|| {
                    StorageError::Transfer(format!("No ETag returned for part {}", part_number))
                })?
                .to_string();

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
            part_number += 1;

            if bytes_in_part < PART_SIZE {
                break;
            }

            part = read_part(reader).await?;
            if part.is_empty() {
                break;
            }
        }

        client
            .complete_multipart_upload()
            .bucket(&self.settings.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.settings.bucket,
                    key = %key,
                    "Failed to complete multipart upload"
                );
                StorageError::Transfer(e.to_string())
            })?;

        Ok(total_size)
    }
}

/// Fill up to one part from `reader`. Short reads only happen at EOF.
async fn read_part(reader: &mut ByteReader) -> StorageResult<Vec<u8>> {
    let mut buffer = vec![0u8; PART_SIZE];
    let mut filled = 0usize;

    while filled < PART_SIZE {
        let bytes_read = reader.read(&mut buffer[filled..]).await.map_err(|e| {
            StorageError::Transfer(format!("Failed to read from upload stream: {}", e))
        })?;
        if bytes_read == 0 {
            break;
        }
        filled += bytes_read;
    }

    buffer.truncate(filled);
    Ok(buffer)
}

fn map_get_error(err: SdkError<GetObjectError>, key: &str) -> StorageError {
    match &err {
        SdkError::ServiceError(service_err)
            if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
        {
            StorageError::NotFound(key.to_string())
        }
        _ => StorageError::Transfer(err.to_string()),
    }
}

#[async_trait]
impl StorageAdapter for S3Adapter {
    async fn init(&self) -> StorageResult<()> {
        self.client
            .get_or_try_init(|| self.build_client())
            .await?;

        tracing::debug!(
            bucket = %self.settings.bucket,
            region = %self.settings.region,
            endpoint = ?self.settings.endpoint,
            "S3 client initialised"
        );

        Ok(())
    }

    async fn file_create_by_stream(
        &self,
        key: &str,
        mut reader: ByteReader,
        content_type: Option<&str>,
    ) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let client = self.client()?;
        let content_type = content_type.unwrap_or(DEFAULT_MIMETYPE);
        let start = Instant::now();

        let first_part = read_part(&mut reader).await?;
        let size = if first_part.len() < PART_SIZE {
            self.put_single(client, key, first_part, content_type)
                .await?
        } else {
            self.put_multipart(client, key, first_part, &mut reader, content_type)
                .await?
        };

        tracing::info!(
            bucket = %self.settings.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(Some(self.generate_url(key)))
    }

    async fn file_create_by_url(&self, key: &str, url: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let body = fetch_remote(&self.http, &self.policy, url).await?;
        let content_type = body.probe.content_type.clone();

        self.file_create_by_stream(key, body.reader, content_type.as_deref())
            .await
    }

    async fn file_read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let client = self.client()?;

        let response = client
            .get_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn file_read_by_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let client = self.client()?;

        let response = client
            .get_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;

        let bucket = self.settings.bucket.clone();
        let owned_key = key.to_string();
        let stream = ReaderStream::new(response.body.into_async_read()).map(move |item| {
            item.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %owned_key,
                    "S3 stream read error"
                );
                StorageError::Transfer(e.to_string())
            })
        });

        Ok(Box::pin(stream))
    }

    async fn file_delete(&self, key: &str) -> StorageResult<()> {
        let client = self.client()?;

        client
            .delete_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.settings.bucket,
                    key = %key,
                    "S3 delete failed"
                );
                StorageError::Transfer(e.to_string())
            })?;

        Ok(())
    }

    async fn get_directory_list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let client = self.client()?;
        let mut keys = Vec::new();

        let mut pages = client
            .list_objects_v2()
            .bucket(&self.settings.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::Transfer(e.to_string()))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(String::from)),
            );
        }

        Ok(keys)
    }

    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        filename: Option<&str>,
    ) -> StorageResult<String> {
        let client = self.client()?;

        let presigning_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let presigned_request = client
            .get_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .set_response_content_disposition(filename.map(attachment_disposition))
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::Transfer(e.to_string()))?;

        Ok(presigned_request.uri().to_string())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
