//! S3-compatible blob store
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};

use crate::config::{StorageConfig, StorageProvider};
use crate::error::StorageError;

use super::blob_store::{BlobStore, BlobStoreFactory, BucketStatus};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible blob store client
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    /// Set only when AWS needs an explicit location for new buckets
    location: Option<String>,
}

impl S3BlobStore {
    /// Create a new client from configuration
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "file-storage-agent",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let location = (config.provider == StorageProvider::S3 && region != DEFAULT_REGION)
            .then_some(region);

        Self {
            client: Client::from_conf(s3_config),
            location,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn create_bucket(&self, bucket: &str) -> Result<BucketStatus, StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if let Some(location) = &self.location {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(BucketStatus::Created),
            Err(e) => match e.as_service_error() {
                Some(err)
                    if err.is_bucket_already_exists() || err.is_bucket_already_owned_by_you() =>
                {
                    Ok(BucketStatus::AlreadyExists)
                }
                _ => Err(map_sdk_error(
                    format!("Failed to create bucket {}", bucket),
                    DisplayErrorContext(&e).to_string(),
                )),
            },
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type.essence_str())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(
                    format!("Failed to put object {}", key),
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        Ok(())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::SdkError(format!("Invalid presign lifetime: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                map_sdk_error(
                    format!("Failed to presign {}", key),
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        Ok(request.uri().to_string())
    }
}

/// Opens `S3BlobStore` clients
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Factory;

#[async_trait::async_trait]
impl BlobStoreFactory for S3Factory {
    async fn open(&self, config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
        if config.endpoint.is_empty() {
            return Err(StorageError::ConnectionFailed(
                "S3 endpoint is not configured".to_string(),
            ));
        }

        tracing::info!(
            endpoint = %config.endpoint,
            provider = ?config.provider,
            "Opening S3 client"
        );

        Ok(Arc::new(S3BlobStore::new(config)))
    }
}

fn map_sdk_error(context: String, detail: String) -> StorageError {
    if detail.contains("AccessDenied") || detail.contains("403") {
        StorageError::AccessDenied(format!("{}: {}", context, detail))
    } else if detail.contains("NoSuchBucket") {
        StorageError::BucketNotFound(format!("{}: {}", context, detail))
    } else {
        StorageError::SdkError(format!("{}: {}", context, detail))
    }
}
