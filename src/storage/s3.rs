use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{content_type_for, object_key, safe_keyword, Payload, RelayRequest, StorageRelay};
use crate::config::StorageConfig;
use crate::error::RelayError;
use crate::models::StorageRef;

/// Relay to an S3-compatible bucket (R2, MinIO, S3)
#[derive(Debug, Clone)]
pub struct S3Relay {
    client: S3Client,
    http: reqwest::Client,
    bucket: String,
    public_url: Option<String>,
    presign_ttl: Duration,
    max_bytes: u64,
}

impl S3Relay {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url
            .clone()
            .ok_or_else(|| anyhow!("storage endpoint_url is not set"))?;
        let (Some(access_key), Some(secret_key)) =
            (config.access_key_id.clone(), config.secret_access_key.clone())
        else {
            return Err(anyhow!("storage credentials are not set"));
        };

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(Credentials::new(access_key, secret_key, None, None, "static"))
            .force_path_style(true)
            .build();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        info!("☁️ Object storage relay configured for bucket {}", config.bucket);

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            http,
            bucket: config.bucket.clone(),
            public_url: config.public_url.clone(),
            presign_ttl: Duration::from_secs(config.presign_ttl_secs),
            max_bytes: config.max_object_mb * 1024 * 1024,
        })
    }

    async fn read_payload(&self, request: &RelayRequest<'_>) -> Result<Vec<u8>, RelayError> {
        match request.payload {
            Payload::File(path) => {
                let size = tokio::fs::metadata(path).await?.len();
                self.check_size(size)?;
                Ok(tokio::fs::read(path).await?)
            }
            Payload::Remote => {
                let response = self
                    .http
                    .get(request.url)
                    .send()
                    .await
                    .map_err(|e| RelayError::Download(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(RelayError::Download(format!("HTTP {}", response.status())));
                }
                if let Some(length) = response.content_length() {
                    self.check_size(length)?;
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| RelayError::Download(e.to_string()))?;
                self.check_size(bytes.len() as u64)?;
                Ok(bytes.to_vec())
            }
        }
    }

    fn check_size(&self, size: u64) -> Result<(), RelayError> {
        if size > self.max_bytes {
            return Err(RelayError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageRelay for S3Relay {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn put(&self, request: &RelayRequest<'_>) -> Result<StorageRef, RelayError> {
        let body = self.read_payload(request).await?;
        let size = body.len();

        let key = object_key(request.kind, request.item_id, request.keyword, request.url);
        let filename = key.rsplit('/').next().unwrap_or(&key).to_string();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type_for(request.kind, request.url))
            .content_disposition(format!("attachment; filename=\"{}\"", filename))
            .cache_control("public, max-age=31536000")
            .metadata("original-url", request.url)
            .metadata("keyword", safe_keyword(request.keyword))
            .metadata("task-id", request.task_id)
            .send()
            .await
            .map_err(|e| RelayError::Upload(e.to_string()))?;

        debug!("☁️ Uploaded {} bytes to {}", size, key);

        let url = self
            .public_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key));
        Ok(StorageRef { key, url })
    }

    async fn presign(&self, key: &str) -> Result<String, RelayError> {
        if let Some(base) = &self.public_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
        }

        let presigning = PresigningConfig::expires_in(self.presign_ttl)
            .map_err(|e| RelayError::Presign(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| RelayError::Presign(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}
